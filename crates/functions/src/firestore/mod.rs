//! Firestore document store.
//!
//! Handlers talk to Firestore through the [`DocumentStore`] port so they can
//! be exercised against an in-memory store. [`FirestoreClient`] is the
//! production adapter speaking the Firestore REST API.
//!
//! Documents travel through the port as plain JSON objects ([`Fields`]);
//! [`to_fields`] and [`from_fields`] convert them to and from the record
//! types in `shareapp_core`.

mod client;
pub mod value;

pub use client::FirestoreClient;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shareapp_core::DocumentPath;
use thiserror::Error;

use crate::google::TokenError;

/// Document contents keyed by top-level field name.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur when reading or writing documents.
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Could not obtain an access token.
    #[error("Authentication error: {0}")]
    Auth(#[from] TokenError),

    /// Firestore returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The document to update does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A value could not be converted to or from document fields.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid request URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// How [`DocumentStore::set`] treats fields already stored in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The document becomes exactly the given fields.
    Replace,
    /// Given fields overwrite stored ones; other fields are kept. Nested
    /// maps merge key by key, so stored keys they omit survive.
    Merge,
}

/// Port for document reads and writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document. Returns `None` if it does not exist.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Fields>, FirestoreError>;

    /// Create or overwrite a document.
    async fn set(
        &self,
        path: &DocumentPath,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), FirestoreError>;

    /// Overwrite the given top-level fields of an existing document. Map
    /// values replace the stored map whole.
    ///
    /// Fails with [`FirestoreError::NotFound`] if the document does not exist.
    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<(), FirestoreError>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete(&self, path: &DocumentPath) -> Result<(), FirestoreError>;
}

/// Serialize a record into document fields.
///
/// # Errors
///
/// Returns `FirestoreError::Encoding` if the value does not serialize to a
/// JSON object.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, FirestoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(FirestoreError::Encoding(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(FirestoreError::Encoding(e.to_string())),
    }
}

/// Deserialize document fields into a record.
///
/// # Errors
///
/// Returns `FirestoreError::Encoding` if the fields do not match `T`.
pub fn from_fields<T: DeserializeOwned>(fields: Fields) -> Result<T, FirestoreError> {
    serde_json::from_value(serde_json::Value::Object(fields))
        .map_err(|e| FirestoreError::Encoding(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use shareapp_core::{CustomerRef, PaymentProfile};

    use super::*;

    #[test]
    fn test_to_fields_from_record() {
        let fields = to_fields(&PaymentProfile::pending(None)).unwrap();
        assert_eq!(fields.get("custId"), Some(&json!("new")));
    }

    #[test]
    fn test_to_fields_rejects_scalars() {
        assert!(matches!(
            to_fields(&"just a string"),
            Err(FirestoreError::Encoding(_))
        ));
    }

    #[test]
    fn test_from_fields() {
        let mut fields = Fields::new();
        fields.insert("custId".to_string(), json!("cus_9"));
        let profile: PaymentProfile = from_fields(fields).unwrap();
        assert!(matches!(profile.customer, CustomerRef::Existing(_)));
        assert!(profile.email.is_none());
    }

    #[test]
    fn test_from_fields_mismatch() {
        let result: Result<PaymentProfile, _> = from_fields(Fields::new());
        assert!(matches!(result, Err(FirestoreError::Encoding(_))));
    }
}
