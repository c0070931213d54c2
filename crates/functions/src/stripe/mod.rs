//! Stripe payment API.
//!
//! The payment-source handler uses the [`PaymentApi`] port; [`StripeClient`]
//! implements it against the Stripe REST API.
//!
//! # Idempotency
//!
//! Firestore triggers are delivered at least once and rerun on every write
//! to a token document. Mutating calls carry an `Idempotency-Key` derived
//! from the account and token document, so a replay within Stripe's key
//! window returns the original response.
//!
//! Keys alone do not cover a token reaching Stripe under two different
//! calls: tokens are single use, and once the customer exists a retry takes
//! the attach path. The handler therefore looks the token's card up on the
//! customer first and only attaches cards that are not there yet.

mod client;
mod types;

pub use client::StripeClient;
pub use types::{Customer, SourceList, Token, TokenCard};

use async_trait::async_trait;
use shareapp_core::{CustomerId, Email, PaymentSource};
use thiserror::Error;

/// Errors that can occur when calling Stripe.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe returned an error response.
    #[error("Stripe API error ({status}, {kind}): {message}")]
    Api {
        status: u16,
        /// Stripe error type, e.g. `card_error` or `invalid_request_error`.
        kind: String,
        /// Stripe error code, e.g. `token_already_used`.
        code: Option<String>,
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Parameters for creating a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer<'a> {
    /// Customer email, if the account has one.
    pub email: Option<&'a Email>,
    /// Card token to attach as the default source.
    pub source: &'a str,
    /// Key under which Stripe deduplicates retries of this request.
    pub idempotency_key: String,
}

/// Port for the Stripe calls the handlers make.
#[async_trait]
pub trait PaymentApi: Send + Sync {
    /// Create a customer with the token as its funding source.
    async fn create_customer(&self, params: NewCustomer<'_>) -> Result<Customer, StripeError>;

    /// Retrieve a customer, including its sources.
    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Customer, StripeError>;

    /// Retrieve a token, used or not.
    async fn retrieve_token(&self, token: &str) -> Result<Token, StripeError>;

    /// List a customer's sources after the source `starting_after`.
    async fn list_sources(
        &self,
        customer: &CustomerId,
        starting_after: Option<&str>,
    ) -> Result<SourceList, StripeError>;

    /// Attach a token to an existing customer as an additional source.
    async fn attach_source(
        &self,
        customer: &CustomerId,
        token: &str,
        idempotency_key: String,
    ) -> Result<PaymentSource, StripeError>;
}
