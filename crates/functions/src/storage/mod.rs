//! Cloud Storage blob store.
//!
//! Handlers delete images through the [`BlobStore`] port; [`StorageClient`]
//! is the production adapter for the Cloud Storage JSON API.

mod client;

pub use client::StorageClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::google::TokenError;

/// Errors that can occur when deleting objects.
#[derive(Debug, Error)]
pub enum StorageError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Could not obtain an access token.
    #[error("Authentication error: {0}")]
    Auth(#[from] TokenError),

    /// Cloud Storage returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Invalid request URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result of deleting a single object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object existed and was removed.
    Deleted,
    /// There was no object at that name.
    Missing,
}

/// Port for object deletion.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Delete the object named `name`.
    async fn delete(&self, name: &str) -> Result<DeleteOutcome, StorageError>;

    /// Delete every object whose name starts with `prefix`.
    ///
    /// Returns the number of objects removed. Stops at the first failure.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError>;
}
