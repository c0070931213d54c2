//! Cloud Storage JSON API client.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use super::{BlobStore, DeleteOutcome, StorageError};
use crate::config::GoogleConfig;
use crate::google::{AccessTokenProvider, bearer};

/// Production Cloud Storage endpoint.
const STORAGE_API_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// Objects requested per list page.
const LIST_PAGE_SIZE: &str = "1000";

/// `objects.list` response, restricted to the fields we request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectName>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectName {
    name: String,
}

/// Cloud Storage client bound to one bucket.
#[derive(Clone)]
pub struct StorageClient {
    client: reqwest::Client,
    tokens: AccessTokenProvider,
    /// `.../storage/v1/b/{bucket}/o`
    objects_root: String,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("objects_root", &self.objects_root)
            .finish_non_exhaustive()
    }
}

impl StorageClient {
    /// Create a client for the configured bucket.
    ///
    /// Targets the emulator when `STORAGE_EMULATOR_HOST` is configured.
    #[must_use]
    pub fn new(client: reqwest::Client, tokens: AccessTokenProvider, config: &GoogleConfig) -> Self {
        let api_base = config.storage_emulator_host.as_ref().map_or_else(
            || STORAGE_API_BASE.to_string(),
            |host| {
                let host = host.trim_end_matches('/');
                if host.starts_with("http://") || host.starts_with("https://") {
                    format!("{host}/storage/v1")
                } else {
                    format!("http://{host}/storage/v1")
                }
            },
        );

        Self {
            client,
            tokens,
            objects_root: format!(
                "{api_base}/b/{}/o",
                urlencoding::encode(&config.bucket)
            ),
        }
    }

    /// Object names are a single path segment, so `/` must be escaped too.
    fn object_url(&self, name: &str) -> Result<Url, StorageError> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.objects_root,
            urlencoding::encode(name)
        ))?)
    }

    fn list_url(&self, prefix: &str, page_token: Option<&str>) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.objects_root)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("prefix", prefix)
                .append_pair("maxResults", LIST_PAGE_SIZE)
                .append_pair("fields", "items(name),nextPageToken");
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url) -> Result<reqwest::Response, StorageError> {
        let token = self.tokens.token().await?;
        Ok(self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, bearer(&token))
            .send()
            .await?)
    }

    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<ObjectList, StorageError> {
        let url = self.list_url(prefix, page_token)?;
        let response = self.send(Method::GET, url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BlobStore for StorageClient {
    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> Result<DeleteOutcome, StorageError> {
        let url = self.object_url(name)?;
        let response = self.send(Method::DELETE, url).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("Object does not exist");
            return Ok(DeleteOutcome::Missing);
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }
        Ok(DeleteOutcome::Deleted)
    }

    #[instrument(skip(self))]
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut deleted = 0;
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(prefix, page_token.as_deref()).await?;
            for object in &page.items {
                if self.delete(&object.name).await? == DeleteOutcome::Deleted {
                    deleted += 1;
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(deleted, "Deleted objects under prefix");
        Ok(deleted)
    }
}

async fn api_error(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    StorageError::Api { status, message }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::Client;

    use super::*;
    use crate::google::TokenSource;

    fn client(emulator: Option<&str>) -> StorageClient {
        let config = GoogleConfig {
            project_id: "shareapp-rrd".to_string(),
            database: "(default)".to_string(),
            bucket: "shareapp-rrd.appspot.com".to_string(),
            firestore_emulator_host: None,
            storage_emulator_host: emulator.map(String::from),
            access_token: None,
        };
        let tokens = AccessTokenProvider::new(Client::new(), TokenSource::Emulator);
        StorageClient::new(Client::new(), tokens, &config)
    }

    #[test]
    fn test_object_url_escapes_slashes() {
        let url = client(None).object_url("profile_pics/uid1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/shareapp-rrd.appspot.com/o/profile_pics%2Fuid1"
        );
    }

    #[test]
    fn test_list_url() {
        let url = client(None).list_url("items/X/", Some("tok")).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("prefix".to_string(), "items/X/".to_string())));
        assert!(pairs.contains(&("pageToken".to_string(), "tok".to_string())));
        assert!(pairs.contains(&("maxResults".to_string(), "1000".to_string())));
    }

    #[test]
    fn test_emulator_host_forms() {
        let bare = client(Some("localhost:9199")).object_url("a").unwrap();
        assert!(bare.as_str().starts_with("http://localhost:9199/storage/v1/b/"));

        let with_scheme = client(Some("http://127.0.0.1:9199/")).object_url("a").unwrap();
        assert!(with_scheme.as_str().starts_with("http://127.0.0.1:9199/storage/v1/b/"));
    }

    #[test]
    fn test_object_list_parsing() {
        let page: ObjectList = serde_json::from_str(
            r#"{"items":[{"name":"items/X/1.jpg"},{"name":"items/X/2.jpg"}],"nextPageToken":"n"}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("n"));

        let empty: ObjectList = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
        assert!(empty.next_page_token.is_none());
    }
}
