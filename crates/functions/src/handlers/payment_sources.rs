//! Payment-source sync: turn a client-submitted card token into a Stripe
//! source and persist it under the account.
//!
//! ```text
//! cards/{uid}/tokens/{tokenId} written
//!   read cards/{uid}
//!   custId == "new"  -> create customer (email, token)
//!                       update cards/{uid}.custId
//!                       source = customer.sources[0]
//!   custId == cus_.. -> retrieve customer
//!                       retrieve token -> card fingerprint
//!                       card on customer  -> source = that source
//!                       otherwise         -> attach token, source = attached
//!   merge cards/{uid}/sources/{fingerprint} <- source
//! ```
//!
//! Stripe tokens are single use. A redelivered event, or a later write to
//! the same token document, finds its card already on the customer and
//! does not send the token again.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use shareapp_core::{
    AccountId, CustomerId, CustomerRef, DocumentPath, Fingerprint, PaymentProfile, PaymentSource,
    PaymentToken, TokenId,
};
use tracing::{debug, info, instrument, warn};

use super::HandlerError;
use crate::firestore::{DocumentStore, WriteMode, from_fields, to_fields};
use crate::stripe::{Customer, NewCustomer, PaymentApi};

/// Why a token write was acknowledged without doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The token document was deleted.
    Tombstone,
    /// The token document has no usable `tokenId`.
    MissingToken,
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PaymentSourceOutcome {
    Skipped {
        reason: SkipReason,
    },
    Synced {
        customer: CustomerId,
        fingerprint: Fingerprint,
        /// A Stripe customer was created for the account.
        created_customer: bool,
    },
}

/// Handler for writes to `cards/{accountId}/tokens/{tokenId}`.
#[derive(Clone)]
pub struct PaymentSourceSync {
    documents: Arc<dyn DocumentStore>,
    payments: Arc<dyn PaymentApi>,
}

impl std::fmt::Debug for PaymentSourceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSourceSync").finish_non_exhaustive()
    }
}

impl PaymentSourceSync {
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, payments: Arc<dyn PaymentApi>) -> Self {
        Self {
            documents,
            payments,
        }
    }

    /// Sync the source for a written token document.
    ///
    /// `written` is the token document after the write, `None` if the write
    /// deleted it.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError` if the payment profile is missing, a Stripe or
    /// Firestore call fails, or Stripe returns no usable source. Nothing
    /// written before the failure is rolled back.
    #[instrument(skip(self, written), fields(account_id = %account_id, token_id = %token_id))]
    pub async fn on_token_written(
        &self,
        account_id: &AccountId,
        token_id: &TokenId,
        written: Option<PaymentToken>,
    ) -> Result<PaymentSourceOutcome, HandlerError> {
        let Some(written) = written else {
            debug!("Token document deleted, nothing to sync");
            return Ok(PaymentSourceOutcome::Skipped {
                reason: SkipReason::Tombstone,
            });
        };

        let Some(token) = written.token.filter(|t| !t.trim().is_empty()) else {
            warn!("Token document has no tokenId");
            return Ok(PaymentSourceOutcome::Skipped {
                reason: SkipReason::MissingToken,
            });
        };

        let profile_path = DocumentPath::payment_profile(account_id);
        let profile: PaymentProfile = match self.documents.get(&profile_path).await? {
            Some(fields) => from_fields(fields)?,
            None => return Err(HandlerError::MissingPaymentProfile(account_id.clone())),
        };

        let (customer, source, created_customer) = match profile.customer {
            CustomerRef::Pending => {
                let (customer, source) = self
                    .create_customer(account_id, token_id, &token, &profile)
                    .await?;
                (customer, source, true)
            }
            CustomerRef::Existing(customer) => {
                let source = self
                    .attach_to_existing(account_id, token_id, &token, &customer)
                    .await?;
                (customer, source, false)
            }
        };

        let fingerprint = source.fingerprint().ok_or_else(|| {
            HandlerError::NoFingerprint(source.id().unwrap_or("unknown").to_string())
        })?;

        self.documents
            .set(
                &DocumentPath::payment_source(account_id, &fingerprint),
                source.into_fields(),
                WriteMode::Merge,
            )
            .await?;

        info!(
            customer_id = %customer,
            fingerprint = %fingerprint,
            created_customer,
            "Payment source synced"
        );
        Ok(PaymentSourceOutcome::Synced {
            customer,
            fingerprint,
            created_customer,
        })
    }

    /// Create the account's Stripe customer with the token as its source and
    /// record the customer ID on the profile.
    async fn create_customer(
        &self,
        account_id: &AccountId,
        token_id: &TokenId,
        token: &str,
        profile: &PaymentProfile,
    ) -> Result<(CustomerId, PaymentSource), HandlerError> {
        let customer = self
            .payments
            .create_customer(NewCustomer {
                email: profile.email.as_ref(),
                source: token,
                idempotency_key: format!("customer-{account_id}-{token_id}"),
            })
            .await?;
        debug!(customer_id = %customer.id, "Created Stripe customer");

        self.documents
            .update(
                &DocumentPath::payment_profile(account_id),
                to_fields(&json!({ "custId": CustomerRef::Existing(customer.id.clone()) }))?,
            )
            .await?;

        let source = customer
            .first_source()
            .cloned()
            .ok_or_else(|| HandlerError::NoSource(customer.id.clone()))?;
        Ok((customer.id, source))
    }

    /// Resolve the token's source on a customer created by an earlier token,
    /// attaching the token only if its card is not on the customer yet.
    async fn attach_to_existing(
        &self,
        account_id: &AccountId,
        token_id: &TokenId,
        token: &str,
        customer: &CustomerId,
    ) -> Result<PaymentSource, HandlerError> {
        let existing = self.payments.retrieve_customer(customer).await?;
        if existing.deleted {
            return Err(HandlerError::CustomerDeleted(existing.id));
        }

        let card = self.payments.retrieve_token(token).await?;
        let fingerprint = card
            .fingerprint()
            .ok_or_else(|| HandlerError::NoFingerprint(card.id.clone()))?;

        if let Some(source) = self.find_source(existing, &fingerprint).await? {
            info!(source_id = ?source.id(), "Card already attached, skipping attach");
            return Ok(source);
        }

        let source = self
            .payments
            .attach_source(customer, token, format!("source-{account_id}-{token_id}"))
            .await?;
        debug!(source_id = ?source.id(), "Attached token to existing customer");
        Ok(source)
    }

    /// Search every page of the customer's sources for the card.
    async fn find_source(
        &self,
        customer: Customer,
        fingerprint: &Fingerprint,
    ) -> Result<Option<PaymentSource>, HandlerError> {
        let Some(mut page) = customer.sources else {
            return Ok(None);
        };

        loop {
            if let Some(source) = page.find(fingerprint) {
                return Ok(Some(source.clone()));
            }
            let Some(cursor) = page.next_cursor().map(str::to_owned) else {
                return Ok(None);
            };
            page = self
                .payments
                .list_sources(&customer.id, Some(&cursor))
                .await?;
        }
    }
}
