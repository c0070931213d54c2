//! Google Cloud OAuth access tokens for the Firestore and Cloud Storage clients.
//!
//! On Cloud Run / Cloud Functions the service account token comes from the
//! instance metadata server. Tokens are cached in memory and refreshed
//! shortly before they expire. Local runs can supply a static token, and
//! emulators accept the fixed `owner` token.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::config::GoogleConfig;

/// Metadata server endpoint for the default service account's token.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this many seconds before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token accepted by the Firestore and Cloud Storage emulators.
const EMULATOR_TOKEN: &str = "owner";

/// Errors that can occur while obtaining an access token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// HTTP request to the metadata server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Metadata server answered with an error status.
    #[error("Metadata server error: {status} - {message}")]
    Metadata { status: u16, message: String },
}

/// Where bearer tokens come from.
#[derive(Clone)]
pub enum TokenSource {
    /// A fixed token (`GOOGLE_ACCESS_TOKEN`).
    Static(SecretString),
    /// The emulator token.
    Emulator,
    /// The GCE / Cloud Run metadata server.
    MetadataServer,
}

impl TokenSource {
    /// Source for talking to production Google APIs.
    #[must_use]
    pub fn from_config(config: &GoogleConfig) -> Self {
        config
            .access_token
            .clone()
            .map_or(Self::MetadataServer, Self::Static)
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Static([REDACTED])"),
            Self::Emulator => f.write_str("Emulator"),
            Self::MetadataServer => f.write_str("MetadataServer"),
        }
    }
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    /// Token lifetime in seconds.
    expires_in: i64,
}

struct CachedToken {
    token: SecretString,
    /// Unix timestamp after which the token must be refreshed.
    refresh_at: i64,
}

/// Shared, cached access-token provider.
#[derive(Clone)]
pub struct AccessTokenProvider {
    inner: Arc<AccessTokenProviderInner>,
}

struct AccessTokenProviderInner {
    client: reqwest::Client,
    source: TokenSource,
    cached: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for AccessTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenProvider")
            .field("source", &self.inner.source)
            .finish_non_exhaustive()
    }
}

impl AccessTokenProvider {
    /// Create a provider that fetches tokens with `client`.
    #[must_use]
    pub fn new(client: reqwest::Client, source: TokenSource) -> Self {
        Self {
            inner: Arc::new(AccessTokenProviderInner {
                client,
                source,
                cached: RwLock::new(None),
            }),
        }
    }

    /// Get a bearer token, refreshing it from the metadata server if needed.
    ///
    /// # Errors
    ///
    /// Returns `TokenError` if the metadata server cannot be reached or
    /// answers with an error.
    pub async fn token(&self) -> Result<SecretString, TokenError> {
        match &self.inner.source {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Emulator => Ok(SecretString::from(EMULATOR_TOKEN)),
            TokenSource::MetadataServer => self.metadata_token().await,
        }
    }

    async fn metadata_token(&self) -> Result<SecretString, TokenError> {
        let now = chrono::Utc::now().timestamp();

        if let Some(cached) = self.inner.cached.read().await.as_ref()
            && now < cached.refresh_at
        {
            return Ok(cached.token.clone());
        }

        let mut cached = self.inner.cached.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(current) = cached.as_ref()
            && now < current.refresh_at
        {
            return Ok(current.token.clone());
        }

        let fresh = self.fetch_metadata_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    #[instrument(skip(self))]
    async fn fetch_metadata_token(&self) -> Result<CachedToken, TokenError> {
        let now = chrono::Utc::now().timestamp();

        let response = self
            .inner
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TokenError::Metadata {
                status: status.as_u16(),
                message,
            });
        }

        let body: MetadataTokenResponse = response.json().await?;
        debug!(expires_in = body.expires_in, "Fetched access token from metadata server");

        Ok(CachedToken {
            token: SecretString::from(body.access_token),
            refresh_at: now + body.expires_in - EXPIRY_MARGIN_SECS,
        })
    }
}

/// Format a bearer `Authorization` header value.
pub(crate) fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn google_config(access_token: Option<&str>) -> GoogleConfig {
        GoogleConfig {
            project_id: "p".to_string(),
            database: "(default)".to_string(),
            bucket: "p.appspot.com".to_string(),
            firestore_emulator_host: None,
            storage_emulator_host: None,
            access_token: access_token.map(SecretString::from),
        }
    }

    #[test]
    fn test_source_from_config() {
        assert!(matches!(
            TokenSource::from_config(&google_config(None)),
            TokenSource::MetadataServer
        ));
        assert!(matches!(
            TokenSource::from_config(&google_config(Some("ya29.abc"))),
            TokenSource::Static(_)
        ));
    }

    #[tokio::test]
    async fn test_static_and_emulator_tokens() {
        let provider = AccessTokenProvider::new(
            reqwest::Client::new(),
            TokenSource::Static(SecretString::from("ya29.abc")),
        );
        assert_eq!(provider.token().await.unwrap().expose_secret(), "ya29.abc");

        let emulator = AccessTokenProvider::new(reqwest::Client::new(), TokenSource::Emulator);
        assert_eq!(emulator.token().await.unwrap().expose_secret(), "owner");
    }

    #[test]
    fn test_debug_redacts_static_token() {
        let provider = AccessTokenProvider::new(
            reqwest::Client::new(),
            TokenSource::Static(SecretString::from("ya29.secret")),
        );
        let output = format!("{provider:?}");
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("ya29.secret"));
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(bearer(&SecretString::from("owner")), "Bearer owner");
    }
}
