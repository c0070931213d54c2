//! Account lifecycle: seed and tear down the per-account documents.
//!
//! ```text
//! created  -> set cards/{uid}     {custId: "new", email}
//!             set users/{uid}     {email, avatar, name, lastActive, creationDate}
//! deleted  -> delete cards/{uid}
//!             delete profile_pics/{uid}
//!             delete users/{uid}
//! ```
//!
//! Side effects are independent: they run concurrently, each exactly once,
//! and one failing never prevents the others.

use std::sync::Arc;

use serde::Serialize;
use shareapp_core::{AccountId, DocumentPath, Email, PaymentProfile, UserProfile, profile_image};
use tracing::{info, instrument, warn};

use super::StepOutcome;
use crate::config::ProfileDefaults;
use crate::firestore::{DocumentStore, FirestoreError, WriteMode, to_fields};
use crate::storage::{BlobStore, DeleteOutcome, StorageError};

/// Validated input of an account-created event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub account_id: AccountId,
    pub email: Option<Email>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// What happened to each document written for a new account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountCreated {
    pub payment_profile: StepOutcome,
    pub user_profile: StepOutcome,
}

impl AccountCreated {
    /// Number of failed side effects.
    #[must_use]
    pub fn failures(&self) -> usize {
        [&self.payment_profile, &self.user_profile]
            .into_iter()
            .filter(|outcome| outcome.is_failed())
            .count()
    }
}

/// What happened to each resource removed for a deleted account.
///
/// Firestore deletes succeed whether or not the document existed, so only
/// the profile image can report [`StepOutcome::AlreadyAbsent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountDeleted {
    pub payment_profile: StepOutcome,
    pub profile_image: StepOutcome,
    pub user_profile: StepOutcome,
}

impl AccountDeleted {
    /// Number of failed side effects.
    #[must_use]
    pub fn failures(&self) -> usize {
        [&self.payment_profile, &self.profile_image, &self.user_profile]
            .into_iter()
            .filter(|outcome| outcome.is_failed())
            .count()
    }
}

/// Handler for auth user-created and user-deleted events.
#[derive(Clone)]
pub struct AccountLifecycle {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    defaults: ProfileDefaults,
}

impl std::fmt::Debug for AccountLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLifecycle")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl AccountLifecycle {
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        defaults: ProfileDefaults,
    ) -> Self {
        Self {
            documents,
            blobs,
            defaults,
        }
    }

    /// Write the payment profile and user profile of a new account.
    #[instrument(skip(self, account), fields(account_id = %account.account_id))]
    pub async fn on_created(&self, account: NewAccount) -> AccountCreated {
        self.on_created_at(account, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// [`on_created`](Self::on_created) with an explicit clock reading, in
    /// epoch milliseconds, for both profile timestamps.
    pub async fn on_created_at(&self, account: NewAccount, now_millis: i64) -> AccountCreated {
        let NewAccount {
            account_id,
            email,
            display_name,
            photo_url,
        } = account;

        let payment_profile = PaymentProfile::pending(email.clone());
        let user_profile = UserProfile::new(
            email,
            photo_url.unwrap_or_else(|| self.defaults.avatar_url.clone()),
            display_name.unwrap_or_else(|| self.defaults.display_name.clone()),
            now_millis,
        );

        let (payment_profile, user_profile) = tokio::join!(
            self.replace(DocumentPath::payment_profile(&account_id), &payment_profile),
            self.replace(DocumentPath::user(&account_id), &user_profile),
        );

        let report = AccountCreated {
            payment_profile: StepOutcome::from_result("payment_profile", payment_profile),
            user_profile: StepOutcome::from_result("user_profile", user_profile),
        };
        log_report("created", report.failures());
        report
    }

    /// Remove the payment profile, profile image and user profile.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn on_deleted(&self, account_id: &AccountId) -> AccountDeleted {
        let image = profile_image(account_id);

        let (payment_profile, profile_image, user_profile) = tokio::join!(
            self.delete_document(DocumentPath::payment_profile(account_id)),
            self.delete_image(&image),
            self.delete_document(DocumentPath::user(account_id)),
        );

        let report = AccountDeleted {
            payment_profile: StepOutcome::from_result("payment_profile", payment_profile),
            profile_image: StepOutcome::from_result("profile_image", profile_image),
            user_profile: StepOutcome::from_result("user_profile", user_profile),
        };
        log_report("deleted", report.failures());
        report
    }

    async fn replace<T: Serialize + Sync>(
        &self,
        path: DocumentPath,
        record: &T,
    ) -> Result<StepOutcome, FirestoreError> {
        let fields = to_fields(record)?;
        self.documents.set(&path, fields, WriteMode::Replace).await?;
        Ok(StepOutcome::Done)
    }

    async fn delete_document(&self, path: DocumentPath) -> Result<StepOutcome, FirestoreError> {
        self.documents.delete(&path).await?;
        Ok(StepOutcome::Done)
    }

    async fn delete_image(&self, name: &str) -> Result<StepOutcome, StorageError> {
        Ok(match self.blobs.delete(name).await? {
            DeleteOutcome::Deleted => StepOutcome::Done,
            DeleteOutcome::Missing => StepOutcome::AlreadyAbsent,
        })
    }
}

fn log_report(event: &str, failures: usize) {
    if failures == 0 {
        info!(event, "Account {event} handled");
    } else {
        warn!(event, failures, "Account {event} handled with failures");
    }
}
