//! HTTP error type for the trigger routes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::handlers::HandlerError;

/// Error returned by a trigger route.
///
/// 5xx responses make the platform redeliver the event, so only failures
/// worth retrying map to them.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed path segment or payload; redelivery cannot help.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The handler failed.
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Handler(e) if e.is_upstream() => StatusCode::BAD_GATEWAY,
            Self::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Trigger request error"
            );
        }

        // Don't expose upstream error details to callers
        let message = match status {
            StatusCode::BAD_GATEWAY => "External service error".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shareapp_core::{AccountId, CustomerId};

    use super::*;
    use crate::stripe::StripeError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("invalid account id".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid account id");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Handler(HandlerError::Stripe(StripeError::Parse(
                "test".to_string()
            )))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Handler(HandlerError::MissingPaymentProfile(
                AccountId::parse("u1").unwrap()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Handler(HandlerError::CustomerDeleted(
                CustomerId::parse("cus_1").unwrap()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
