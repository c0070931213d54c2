//! Stripe REST API client.
//!
//! Requests are form-encoded and authenticated with the secret key as a
//! bearer token. Customer responses always expand `sources`, which recent
//! API versions omit by default.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use shareapp_core::{CustomerId, PaymentSource};
use tracing::{debug, instrument};
use url::Url;

use super::types::{Customer, ErrorEnvelope, SourceList, Token};
use super::{NewCustomer, PaymentApi, StripeError};
use crate::config::StripeConfig;

/// Page size when listing a customer's sources.
const SOURCES_PAGE_LIMIT: &str = "100";

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    /// API base URL without trailing slash, e.g. `https://api.stripe.com/v1`.
    api_base: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    #[must_use]
    pub fn new(client: Client, config: &StripeConfig) -> Self {
        Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.clone(),
        }
    }

    fn customer_url(&self, id: &CustomerId, suffix: &str) -> Result<Url, StripeError> {
        Url::parse(&format!(
            "{}/customers/{}{suffix}",
            self.api_base,
            urlencoding::encode(id.as_str())
        ))
        .map_err(|e| StripeError::Parse(format!("invalid URL: {e}")))
    }

    fn token_url(&self, token: &str) -> Result<Url, StripeError> {
        Url::parse(&format!(
            "{}/tokens/{}",
            self.api_base,
            urlencoding::encode(token)
        ))
        .map_err(|e| StripeError::Parse(format!("invalid URL: {e}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.secret_key.expose_secret())
    }
}

#[async_trait]
impl PaymentApi for StripeClient {
    #[instrument(skip(self, params), fields(has_email = params.email.is_some()))]
    async fn create_customer(&self, params: NewCustomer<'_>) -> Result<Customer, StripeError> {
        let mut form: Vec<(&str, &str)> = vec![("source", params.source), ("expand[]", "sources")];
        if let Some(email) = params.email {
            form.push(("email", email.as_str()));
        }

        let response = self
            .authorized(self.client.post(format!("{}/customers", self.api_base)))
            .header("Idempotency-Key", &params.idempotency_key)
            .form(&form)
            .send()
            .await?;

        let customer: Customer = parse_response(response).await?;
        debug!(customer_id = %customer.id, "Created Stripe customer");
        Ok(customer)
    }

    #[instrument(skip(self), fields(customer_id = %id))]
    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Customer, StripeError> {
        let mut url = self.customer_url(id, "")?;
        url.query_pairs_mut().append_pair("expand[]", "sources");

        let response = self.authorized(self.client.get(url)).send().await?;
        parse_response(response).await
    }

    #[instrument(skip(self, token))]
    async fn retrieve_token(&self, token: &str) -> Result<Token, StripeError> {
        let url = self.token_url(token)?;
        let response = self.authorized(self.client.get(url)).send().await?;
        parse_response(response).await
    }

    #[instrument(skip(self), fields(customer_id = %customer))]
    async fn list_sources(
        &self,
        customer: &CustomerId,
        starting_after: Option<&str>,
    ) -> Result<SourceList, StripeError> {
        let mut url = self.customer_url(customer, "/sources")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", SOURCES_PAGE_LIMIT);
            if let Some(cursor) = starting_after {
                query.append_pair("starting_after", cursor);
            }
        }

        let response = self.authorized(self.client.get(url)).send().await?;
        let page: SourceList = parse_response(response).await?;
        debug!(count = page.data.len(), has_more = page.has_more, "Listed customer sources");
        Ok(page)
    }

    #[instrument(skip(self, token, idempotency_key), fields(customer_id = %customer))]
    async fn attach_source(
        &self,
        customer: &CustomerId,
        token: &str,
        idempotency_key: String,
    ) -> Result<PaymentSource, StripeError> {
        let url = self.customer_url(customer, "/sources")?;

        let response = self
            .authorized(self.client.post(url))
            .header("Idempotency-Key", idempotency_key)
            .form(&[("source", token)])
            .send()
            .await?;

        let source: PaymentSource = parse_response(response).await?;
        debug!(source_id = ?source.id(), "Attached source to Stripe customer");
        Ok(source)
    }
}

/// Decode a success body as `T`, or a Stripe error envelope into `StripeError::Api`.
async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StripeError> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&text).map_err(|e| StripeError::Parse(e.to_string()));
    }

    Err(api_error(status.as_u16(), &text))
}

fn api_error(status: u16, body: &str) -> StripeError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => StripeError::Api {
            status,
            kind: envelope.error.kind,
            code: envelope.error.code,
            message: envelope
                .error
                .message
                .unwrap_or_else(|| "Unknown error".to_string()),
        },
        Err(_) => StripeError::Api {
            status,
            kind: "unknown".to_string(),
            code: None,
            message: body.to_string(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> StripeClient {
        StripeClient::new(
            Client::new(),
            &StripeConfig {
                secret_key: SecretString::from("sk_test_abc"),
                api_base: "https://api.stripe.com/v1".to_string(),
            },
        )
    }

    #[test]
    fn test_customer_url() {
        let id = CustomerId::parse("cus_123").unwrap();
        assert_eq!(
            client().customer_url(&id, "/sources").unwrap().as_str(),
            "https://api.stripe.com/v1/customers/cus_123/sources"
        );
    }

    #[test]
    fn test_token_url() {
        assert_eq!(
            client().token_url("tok_visa").unwrap().as_str(),
            "https://api.stripe.com/v1/tokens/tok_visa"
        );
        assert_eq!(
            client().token_url("tok/../x").unwrap().as_str(),
            "https://api.stripe.com/v1/tokens/tok%2F..%2Fx"
        );
    }

    #[test]
    fn test_api_error_from_envelope() {
        let err = api_error(
            402,
            r#"{"error":{"type":"card_error","code":"card_declined","message":"Your card was declined."}}"#,
        );
        match &err {
            StripeError::Api {
                status,
                kind,
                code,
                message,
            } => {
                assert_eq!(*status, 402);
                assert_eq!(kind, "card_error");
                assert_eq!(code.as_deref(), Some("card_declined"));
                assert_eq!(message, "Your card was declined.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_without_envelope() {
        let err = api_error(503, "upstream unavailable");
        assert!(matches!(
            &err,
            StripeError::Api { status: 503, kind, message, .. } if kind == "unknown" && message == "upstream unavailable"
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let output = format!("{:?}", client());
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("sk_test_abc"));
    }
}
