//! Application state shared across trigger routes.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{FunctionsConfig, ProfileDefaults};
use crate::firestore::{DocumentStore, FirestoreClient};
use crate::google::{AccessTokenProvider, TokenSource};
use crate::handlers::{AccountLifecycle, CatalogCleanup, PaymentSourceSync};
use crate::storage::{BlobStore, StorageClient};
use crate::stripe::{PaymentApi, StripeClient};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client handles shared by the handlers.
#[derive(Clone)]
pub struct Clients {
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub payments: Arc<dyn PaymentApi>,
}

impl Clients {
    /// Build the production HTTP clients.
    ///
    /// Google calls go to the emulators when their hosts are configured,
    /// authenticated with the emulator token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &FunctionsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let google = &config.google;
        let production_tokens =
            AccessTokenProvider::new(client.clone(), TokenSource::from_config(google));
        let emulator_tokens = AccessTokenProvider::new(client.clone(), TokenSource::Emulator);

        let firestore_tokens = if google.firestore_emulator_host.is_some() {
            emulator_tokens.clone()
        } else {
            production_tokens.clone()
        };
        let storage_tokens = if google.storage_emulator_host.is_some() {
            emulator_tokens
        } else {
            production_tokens
        };

        Ok(Self {
            documents: Arc::new(FirestoreClient::new(client.clone(), firestore_tokens, google)),
            blobs: Arc::new(StorageClient::new(client.clone(), storage_tokens, google)),
            payments: Arc::new(StripeClient::new(client, &config.stripe)),
        })
    }
}

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    accounts: AccountLifecycle,
    payment_sources: PaymentSourceSync,
    catalog: CatalogCleanup,
    await_bulk_deletes: bool,
}

impl AppState {
    /// Wire the handlers to the given clients.
    #[must_use]
    pub fn new(clients: Clients, defaults: ProfileDefaults, await_bulk_deletes: bool) -> Self {
        let Clients {
            documents,
            blobs,
            payments,
        } = clients;

        Self {
            inner: Arc::new(AppStateInner {
                accounts: AccountLifecycle::new(Arc::clone(&documents), Arc::clone(&blobs), defaults),
                payment_sources: PaymentSourceSync::new(documents, payments),
                catalog: CatalogCleanup::new(blobs),
                await_bulk_deletes,
            }),
        }
    }

    /// Build the state for a running service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &FunctionsConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            Clients::from_config(config)?,
            config.profile_defaults.clone(),
            config.await_bulk_deletes,
        ))
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountLifecycle {
        &self.inner.accounts
    }

    #[must_use]
    pub fn payment_sources(&self) -> &PaymentSourceSync {
        &self.inner.payment_sources
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogCleanup {
        &self.inner.catalog
    }

    /// Whether item routes wait for image deletion before responding.
    #[must_use]
    pub fn await_bulk_deletes(&self) -> bool {
        self.inner.await_bulk_deletes
    }
}
