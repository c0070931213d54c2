//! Catalog cleanup: delete an item's images once the item is gone.

use std::sync::Arc;

use shareapp_core::{CatalogItem, ItemId, item_images_prefix};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use super::HandlerError;
use crate::storage::{BlobStore, StorageError};

/// Handler for deletions of `items/{itemId}`.
#[derive(Clone)]
pub struct CatalogCleanup {
    blobs: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for CatalogCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCleanup").finish_non_exhaustive()
    }
}

impl CatalogCleanup {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Start deleting every image under `items/{id}/`.
    ///
    /// `deleted` is the item as it was before deletion. Returns `None`
    /// without touching storage when it has no usable `id` field.
    ///
    /// Must be called within a Tokio runtime; the deletion runs as a
    /// spawned task.
    #[instrument(skip(self, deleted))]
    pub fn on_item_deleted(&self, deleted: Option<CatalogItem>) -> Option<BulkDeletion> {
        let Some(raw) = deleted.and_then(|item| item.id) else {
            debug!("Deleted item has no id, nothing to clean up");
            return None;
        };

        let item_id = match ItemId::parse(&raw) {
            Ok(id) => id,
            Err(e) => {
                warn!(item_id = %raw, error = %e, "Deleted item has an unusable id");
                return None;
            }
        };

        Some(BulkDeletion::spawn(
            Arc::clone(&self.blobs),
            item_images_prefix(&item_id),
        ))
    }
}

/// A prefix deletion running in the background.
///
/// The task logs its own outcome. Dropping the handle, or calling
/// [`detach`](Self::detach), leaves it running.
#[derive(Debug)]
pub struct BulkDeletion {
    prefix: String,
    handle: JoinHandle<Result<usize, StorageError>>,
}

impl BulkDeletion {
    fn spawn(blobs: Arc<dyn BlobStore>, prefix: String) -> Self {
        let span = info_span!("bulk_delete", prefix = %prefix);
        let task_prefix = prefix.clone();

        let handle = tokio::spawn(
            async move {
                let result = blobs.delete_prefix(&task_prefix).await;
                match &result {
                    Ok(count) => info!(deleted = count, "Item images deleted"),
                    Err(e) => error!(error = %e, "Item image deletion failed"),
                }
                result
            }
            .instrument(span),
        );

        Self { prefix, handle }
    }

    /// Object-name prefix being deleted.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wait for the deletion to finish and return how many objects it removed.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::Storage` if the deletion failed, or
    /// `HandlerError::Task` if the task panicked or was cancelled.
    pub async fn wait(self) -> Result<usize, HandlerError> {
        match self.handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(HandlerError::Task(e.to_string())),
        }
    }

    /// Let the deletion finish on its own.
    pub fn detach(self) {
        debug!(prefix = %self.prefix, "Detached item image deletion");
    }
}
