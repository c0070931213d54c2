//! Event handlers.
//!
//! Each handler owns the client handles it needs, injected at startup, and
//! exposes one async method per trigger. They are independent of HTTP so
//! they can be driven directly in tests.
//!
//! Error policy differs per handler:
//!
//! - [`AccountLifecycle`] is best-effort. Every side effect is attempted
//!   once and reports a [`StepOutcome`]; failures are logged, never returned.
//! - [`PaymentSourceSync`] returns [`HandlerError`] so the platform
//!   redelivers the event.
//! - [`CatalogCleanup`] hands back a [`BulkDeletion`] that logs its own
//!   outcome; the caller decides whether to wait for it.

pub mod accounts;
pub mod catalog;
pub mod payment_sources;

pub use accounts::{AccountCreated, AccountDeleted, AccountLifecycle, NewAccount};
pub use catalog::{BulkDeletion, CatalogCleanup};
pub use payment_sources::{PaymentSourceOutcome, PaymentSourceSync, SkipReason};

use std::fmt::Display;

use serde::Serialize;
use shareapp_core::{AccountId, CustomerId};
use thiserror::Error;
use tracing::error;

use crate::firestore::FirestoreError;
use crate::storage::StorageError;
use crate::stripe::StripeError;

/// Result of one independent side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The write or delete succeeded.
    Done,
    /// Nothing to delete.
    AlreadyAbsent,
    /// The call failed; the message has been logged.
    Failed(String),
}

impl StepOutcome {
    /// Whether the step failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Log a failed step and turn it into an outcome.
    fn from_result<E: Display>(step: &'static str, result: Result<Self, E>) -> Self {
        result.unwrap_or_else(|e| {
            error!(step, error = %e, "Side effect failed");
            Self::Failed(e.to_string())
        })
    }
}

/// Errors that fail a handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Document store call failed.
    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    /// Blob store call failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Payment API call failed.
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),

    /// The account has no `cards/{accountId}` document.
    #[error("No payment profile for account {0}")]
    MissingPaymentProfile(AccountId),

    /// The profile references a customer that was deleted in Stripe.
    #[error("Stripe customer {0} has been deleted")]
    CustomerDeleted(CustomerId),

    /// The customer came back without any source to persist.
    #[error("Stripe customer {0} has no payment source")]
    NoSource(CustomerId),

    /// The source or token has no card fingerprint to key the record by.
    #[error("Stripe object {0} has no card fingerprint")]
    NoFingerprint(String),

    /// A spawned task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl HandlerError {
    /// Whether the failure came from an upstream service rather than from
    /// the data this service holds.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Firestore(_) | Self::Storage(_) | Self::Stripe(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_step_outcome_serialization() {
        assert_eq!(
            serde_json::to_value(StepOutcome::Done).unwrap(),
            json!({"status": "done"})
        );
        assert_eq!(
            serde_json::to_value(StepOutcome::AlreadyAbsent).unwrap(),
            json!({"status": "already_absent"})
        );
        assert_eq!(
            serde_json::to_value(StepOutcome::Failed("boom".to_string())).unwrap(),
            json!({"status": "failed", "error": "boom"})
        );
    }

    #[test]
    fn test_from_result_keeps_success() {
        let ok: Result<StepOutcome, String> = Ok(StepOutcome::AlreadyAbsent);
        assert_eq!(StepOutcome::from_result("step", ok), StepOutcome::AlreadyAbsent);

        let err: Result<StepOutcome, String> = Err("permission denied".to_string());
        let outcome = StepOutcome::from_result("step", err);
        assert!(outcome.is_failed());
    }

    #[test]
    fn test_upstream_classification() {
        let account = AccountId::parse("u1").unwrap();
        assert!(!HandlerError::MissingPaymentProfile(account).is_upstream());
        assert!(HandlerError::Stripe(StripeError::Parse("x".to_string())).is_upstream());
    }
}
