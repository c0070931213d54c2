//! Shapes of the Firestore documents the handlers read and write.
//!
//! Field names follow what the mobile client already stores
//! (`custId`, `lastActive`, `creationDate`, `tokenId`), so every struct
//! renames its fields explicitly rather than relying on a blanket case rule.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::email::Email;
use super::id::{CustomerId, Fingerprint, IdError};

/// Stored value of `custId` before a Stripe customer exists.
pub const PENDING_CUSTOMER: &str = "new";

/// Reference from a payment profile to its Stripe customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CustomerRef {
    /// No customer has been created yet (stored as `"new"`).
    Pending,
    /// The account's Stripe customer.
    Existing(CustomerId),
}

impl CustomerRef {
    /// Returns the customer ID, if one has been created.
    #[must_use]
    pub const fn customer_id(&self) -> Option<&CustomerId> {
        match self {
            Self::Pending => None,
            Self::Existing(id) => Some(id),
        }
    }
}

impl TryFrom<String> for CustomerRef {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == PENDING_CUSTOMER {
            Ok(Self::Pending)
        } else {
            CustomerId::try_from(value).map(Self::Existing)
        }
    }
}

impl From<CustomerRef> for String {
    fn from(value: CustomerRef) -> Self {
        match value {
            CustomerRef::Pending => PENDING_CUSTOMER.to_owned(),
            CustomerRef::Existing(id) => id.into_inner(),
        }
    }
}

/// `cards/{accountId}`: links an account to its Stripe customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProfile {
    /// Stripe customer, or the pending sentinel.
    #[serde(rename = "custId")]
    pub customer: CustomerRef,
    /// Account email, used when the customer is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
}

impl PaymentProfile {
    /// Profile written when an account is created.
    #[must_use]
    pub const fn pending(email: Option<Email>) -> Self {
        Self {
            customer: CustomerRef::Pending,
            email,
        }
    }
}

/// `users/{accountId}`: public profile of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
    /// Avatar image URL.
    pub avatar: String,
    /// Display name.
    pub name: String,
    /// Epoch milliseconds.
    #[serde(rename = "lastActive")]
    pub last_active: i64,
    /// Epoch milliseconds.
    #[serde(rename = "creationDate")]
    pub creation_date: i64,
}

impl UserProfile {
    /// Profile of a freshly created account. Both timestamps are `now_millis`.
    #[must_use]
    pub const fn new(email: Option<Email>, avatar: String, name: String, now_millis: i64) -> Self {
        Self {
            email,
            avatar,
            name,
            last_active: now_millis,
            creation_date: now_millis,
        }
    }
}

/// `cards/{accountId}/tokens/{tokenId}`: a card token submitted by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentToken {
    /// Stripe token (`tok_...`) to use as the funding source.
    #[serde(rename = "tokenId", default)]
    pub token: Option<String>,
}

/// `items/{itemId}`: only the `id` field matters to the handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    #[serde(default)]
    pub id: Option<String>,
}

/// Snapshot of a Stripe source object, stored as-is.
///
/// Sources created through the Sources API carry the fingerprint under
/// `card.fingerprint`; card objects attached from a token carry it at the
/// top level. Both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentSource(Map<String, Value>);

impl PaymentSource {
    /// Wrap a raw source object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Stripe object ID (`src_...` or `card_...`).
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Card fingerprint identifying the underlying card number.
    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        let nested = self
            .0
            .get("card")
            .and_then(|card| card.get("fingerprint"))
            .and_then(Value::as_str);
        let top_level = self.0.get("fingerprint").and_then(Value::as_str);

        nested
            .or(top_level)
            .and_then(|fp| Fingerprint::parse(fp).ok())
    }

    /// Consume the snapshot and return the raw source object.
    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}
