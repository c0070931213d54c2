//! Stripe response types.

use serde::Deserialize;
use shareapp_core::{CustomerId, Fingerprint, PaymentSource};

/// A Stripe customer, as returned by create and retrieve.
///
/// Retrieving a deleted customer returns only `id` and `deleted: true`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(default)]
    pub deleted: bool,
    /// Present when the request expanded `sources`.
    #[serde(default)]
    pub sources: Option<SourceList>,
}

impl Customer {
    /// First source in the customer's source list.
    #[must_use]
    pub fn first_source(&self) -> Option<&PaymentSource> {
        self.sources.as_ref().and_then(|list| list.data.first())
    }
}

/// Paginated list of a customer's sources.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourceList {
    #[serde(default)]
    pub data: Vec<PaymentSource>,
    /// More sources follow the last one in `data`.
    #[serde(default)]
    pub has_more: bool,
}

impl SourceList {
    /// Source on this page backed by the card with `fingerprint`.
    #[must_use]
    pub fn find(&self, fingerprint: &Fingerprint) -> Option<&PaymentSource> {
        self.data
            .iter()
            .find(|source| source.fingerprint().as_ref() == Some(fingerprint))
    }

    /// Cursor for the next page, if there is one.
    #[must_use]
    pub fn next_cursor(&self) -> Option<&str> {
        if self.has_more {
            self.data.last().and_then(PaymentSource::id)
        } else {
            None
        }
    }
}

/// A card token, as returned by `GET /v1/tokens/{id}`.
///
/// Retrieving a token works after it has been used, which is what makes it
/// possible to recognise a card that is already attached.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(default)]
    pub card: Option<TokenCard>,
}

/// The card behind a token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenCard {
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl Token {
    /// Fingerprint of the tokenized card.
    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.card
            .as_ref()
            .and_then(|card| card.fingerprint.as_deref())
            .and_then(|fp| Fingerprint::parse(fp).ok())
    }
}

/// Stripe error envelope: `{"error": {...}}`.
#[derive(Debug, Deserialize)]
pub(super) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
