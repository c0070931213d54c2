//! Firestore REST API client.
//!
//! Uses the v1 `documents` resource:
//!
//! ```text
//! GET    {root}/{path}                                    read
//! PATCH  {root}/{path}                                    replace
//! PATCH  {root}/{path}?updateMask.fieldPaths=<leaves>     merge
//! PATCH  {root}/{path}?updateMask..&currentDocument.exists=true   update
//! DELETE {root}/{path}                                    delete
//! ```

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use shareapp_core::DocumentPath;
use tracing::{debug, instrument};
use url::Url;

use super::value::{decode_fields, encode_fields, field_path, merge_field_paths};
use super::{DocumentStore, Fields, FirestoreError, WriteMode};
use crate::config::GoogleConfig;
use crate::google::{AccessTokenProvider, bearer};

/// Production Firestore endpoint.
const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

/// Document resource as returned by the REST API.
#[derive(Debug, Deserialize)]
struct RestDocument {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Firestore client for one database.
#[derive(Clone)]
pub struct FirestoreClient {
    client: reqwest::Client,
    tokens: AccessTokenProvider,
    /// `.../v1/projects/{project}/databases/{database}/documents`
    documents_root: String,
}

impl std::fmt::Debug for FirestoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreClient")
            .field("documents_root", &self.documents_root)
            .finish_non_exhaustive()
    }
}

impl FirestoreClient {
    /// Create a client for the configured project and database.
    ///
    /// Targets the emulator when `FIRESTORE_EMULATOR_HOST` is configured.
    #[must_use]
    pub fn new(client: reqwest::Client, tokens: AccessTokenProvider, config: &GoogleConfig) -> Self {
        let api_base = config
            .firestore_emulator_host
            .as_ref()
            .map_or_else(|| FIRESTORE_API_BASE.to_string(), |host| format!("http://{host}/v1"));

        Self {
            client,
            tokens,
            documents_root: format!(
                "{api_base}/projects/{}/databases/{}/documents",
                config.project_id, config.database
            ),
        }
    }

    fn document_url(&self, path: &DocumentPath) -> Result<Url, FirestoreError> {
        let encoded: Vec<_> = path.segments().map(urlencoding::encode).collect();
        Ok(Url::parse(&format!(
            "{}/{}",
            self.documents_root,
            encoded.join("/")
        ))?)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<reqwest::Response, FirestoreError> {
        let token = self.tokens.token().await?;
        let mut request = self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, bearer(&token));
        if let Some(body) = body {
            request = request.json(&body);
        }
        Ok(request.send().await?)
    }

    /// PATCH a document, optionally restricted to `mask` and requiring existence.
    async fn patch(
        &self,
        path: &DocumentPath,
        fields: &Fields,
        mask: Option<Vec<String>>,
        must_exist: bool,
    ) -> Result<(), FirestoreError> {
        let mut url = self.document_url(path)?;
        if mask.is_some() || must_exist {
            let mut query = url.query_pairs_mut();
            for field in mask.iter().flatten() {
                query.append_pair("updateMask.fieldPaths", field);
            }
            if must_exist {
                query.append_pair("currentDocument.exists", "true");
            }
        }

        let body = json!({ "fields": encode_fields(fields) });
        let response = self.send(Method::PATCH, url, Some(body)).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }
        if must_exist && status == StatusCode::NOT_FOUND {
            return Err(FirestoreError::NotFound(path.to_string()));
        }
        Err(api_error(response).await)
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    #[instrument(skip(self), fields(path = %path))]
    async fn get(&self, path: &DocumentPath) -> Result<Option<Fields>, FirestoreError> {
        let url = self.document_url(path)?;
        let response = self.send(Method::GET, url, None).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("Document does not exist");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        let document: RestDocument = response.json().await?;
        decode_fields(&document.fields).map(Some)
    }

    #[instrument(skip(self, fields), fields(path = %path))]
    async fn set(
        &self,
        path: &DocumentPath,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), FirestoreError> {
        match mode {
            WriteMode::Replace => self.patch(path, &fields, None, false).await,
            // An empty mask would turn the merge into a full replace
            WriteMode::Merge if fields.is_empty() => Ok(()),
            WriteMode::Merge => {
                let mask = merge_field_paths(&fields);
                self.patch(path, &fields, Some(mask), false).await
            }
        }
    }

    #[instrument(skip(self, fields), fields(path = %path))]
    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<(), FirestoreError> {
        if fields.is_empty() {
            return Err(FirestoreError::Encoding(
                "update requires at least one field".to_string(),
            ));
        }
        let mask = fields.keys().map(|name| field_path(name)).collect();
        self.patch(path, &fields, Some(mask), true).await
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete(&self, path: &DocumentPath) -> Result<(), FirestoreError> {
        let url = self.document_url(path)?;
        let response = self.send(Method::DELETE, url, None).await?;
        let status = response.status();

        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(api_error(response).await)
    }
}

/// Convert a non-success response into `FirestoreError::Api`.
async fn api_error(response: reqwest::Response) -> FirestoreError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => match envelope.error.status {
            Some(code) => format!("{code}: {}", envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) => text,
    };
    FirestoreError::Api { status, message }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::Client;
    use shareapp_core::{AccountId, Fingerprint};

    use super::*;
    use crate::google::TokenSource;

    fn config(emulator: Option<&str>) -> GoogleConfig {
        GoogleConfig {
            project_id: "shareapp-rrd".to_string(),
            database: "(default)".to_string(),
            bucket: "shareapp-rrd.appspot.com".to_string(),
            firestore_emulator_host: emulator.map(String::from),
            storage_emulator_host: None,
            access_token: None,
        }
    }

    fn client(emulator: Option<&str>) -> FirestoreClient {
        let tokens = AccessTokenProvider::new(Client::new(), TokenSource::Emulator);
        FirestoreClient::new(Client::new(), tokens, &config(emulator))
    }

    #[test]
    fn test_document_url_production() {
        let account = AccountId::parse("uid1").unwrap();
        let url = client(None)
            .document_url(&DocumentPath::user(&account))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/shareapp-rrd/databases/(default)/documents/users/uid1"
        );
    }

    #[test]
    fn test_document_url_emulator() {
        let account = AccountId::parse("uid1").unwrap();
        let url = client(Some("localhost:8081"))
            .document_url(&DocumentPath::payment_profile(&account))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8081/v1/projects/shareapp-rrd/databases/(default)/documents/cards/uid1"
        );
    }

    #[test]
    fn test_document_url_escapes_segments() {
        let account = AccountId::parse("a b?c").unwrap();
        let fingerprint = Fingerprint::parse("fp#1").unwrap();
        let url = client(None)
            .document_url(&DocumentPath::payment_source(&account, &fingerprint))
            .unwrap();
        assert!(url.as_str().ends_with("/documents/cards/a%20b%3Fc/sources/fp%231"));
    }

    #[test]
    fn test_debug_shows_root_only() {
        let output = format!("{:?}", client(None));
        assert!(output.contains("documents_root"));
    }
}
