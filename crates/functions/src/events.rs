//! Trigger payloads delivered by the platform.
//!
//! Auth events carry the Firebase Auth user record fields the handlers use.
//! Document events carry the JSON-decoded document data before and after
//! the write; a missing side means the document did not exist.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shareapp_core::{AccountId, Email, IdError};
use tracing::warn;

use crate::handlers::NewAccount;

/// `POST /triggers/auth/user-created`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserCreated {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
}

impl AuthUserCreated {
    /// Validate the event into handler input.
    ///
    /// An email that fails validation is dropped with a warning rather than
    /// rejecting the whole event; empty names and photo URLs count as absent.
    ///
    /// # Errors
    ///
    /// Returns `IdError` if `uid` is not a valid account ID.
    pub fn into_new_account(self) -> Result<NewAccount, IdError> {
        let account_id = AccountId::try_from(self.uid)?;

        let email = self.email.and_then(|raw| match Email::parse(&raw) {
            Ok(email) => Some(email),
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Ignoring invalid account email");
                None
            }
        });

        Ok(NewAccount {
            account_id,
            email,
            display_name: non_empty(self.display_name),
            photo_url: non_empty(self.photo_url),
        })
    }
}

/// `POST /triggers/auth/user-deleted`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserDeleted {
    pub uid: String,
}

/// Before and after snapshots of a single document write.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentChange {
    #[serde(default)]
    pub before: Option<Value>,
    #[serde(default)]
    pub after: Option<Value>,
}

impl DocumentChange {
    /// The write removed the document.
    #[must_use]
    pub const fn is_deletion(&self) -> bool {
        self.before.is_some() && self.after.is_none()
    }

    /// Decode the state after the write.
    ///
    /// `None` for a tombstone. Data that does not match `T` decodes as
    /// `T::default()` so the handler sees the fields as absent.
    #[must_use]
    pub fn after_as<T: DeserializeOwned + Default>(&self) -> Option<T> {
        self.after.as_ref().map(decode_or_default)
    }

    /// Decode the state before the write. `None` if the document was created.
    #[must_use]
    pub fn before_as<T: DeserializeOwned + Default>(&self) -> Option<T> {
        self.before.as_ref().map(decode_or_default)
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(value: &Value) -> T {
    T::deserialize(value).unwrap_or_else(|e| {
        warn!(error = %e, "Unexpected document shape in trigger payload");
        T::default()
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
