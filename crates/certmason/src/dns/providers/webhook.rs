//! Generic webhook DNS provider
//!
//! Delegates record management to an HTTP endpoint the operator runs.
//!
//! # Webhook API
//!
//! ```text
//! POST {url}/present
//! POST {url}/cleanup
//! Content-Type: application/json
//!
//! {"fqdn": "_acme-challenge.example.com.", "value": "<txt value>"}
//! ```
//!
//! In raw mode the body carries the unprocessed challenge instead:
//!
//! ```text
//! {"domain": "example.com", "token": "<token>", "keyAuth": "<key authorization>"}
//! ```
//!
//! Any 2xx response is success.
//!
//! Credentials: `WEBHOOK_URL` (required), `WEBHOOK_MODE` (`RAW` for raw
//! mode), `WEBHOOK_TOKEN` (optional secret), `WEBHOOK_AUTH_HEADER` (header
//! carrying the token; bearer auth when absent).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::dns::credentials::CredentialSet;
use crate::dns::provider::{
    challenge_record_fqdn, dns01_txt_value, map_request_error, DnsProvider, DnsProviderError,
    DnsResult,
};

pub const CREDENTIAL_URL: &str = "WEBHOOK_URL";
pub const CREDENTIAL_MODE: &str = "WEBHOOK_MODE";
pub const CREDENTIAL_TOKEN: &str = "WEBHOOK_TOKEN";
pub const CREDENTIAL_AUTH_HEADER: &str = "WEBHOOK_AUTH_HEADER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookMode {
    /// Send the computed record name and value
    Default,
    /// Send domain, token and key authorization untouched
    Raw,
}

#[derive(Debug)]
pub struct WebhookProvider {
    client: Client,
    base_url: String,
    mode: WebhookMode,
    auth_header: Option<String>,
    token: Option<String>,
    timeout_secs: u64,
}

impl WebhookProvider {
    pub fn new(
        base_url: &str,
        mode: WebhookMode,
        auth_header: Option<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> DnsResult<Self> {
        let parsed = url::Url::parse(base_url).map_err(|e| {
            DnsProviderError::Configuration(format!("Invalid webhook URL '{}': {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DnsProviderError::Configuration(format!(
                "Webhook URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mode,
            auth_header,
            token,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn from_credentials(credentials: &CredentialSet, timeout: Duration) -> DnsResult<Self> {
        let url = credentials.require(&[CREDENTIAL_URL])?;
        let mode = match credentials.first_of(&[CREDENTIAL_MODE]) {
            None => WebhookMode::Default,
            Some(m) if m.eq_ignore_ascii_case("raw") => WebhookMode::Raw,
            Some(m) if m.eq_ignore_ascii_case("default") => WebhookMode::Default,
            Some(other) => {
                return Err(DnsProviderError::Configuration(format!(
                    "Unknown webhook mode '{}'",
                    other
                )))
            }
        };

        Self::new(
            url,
            mode,
            credentials.first_of(&[CREDENTIAL_AUTH_HEADER]).map(str::to_string),
            credentials.first_of(&[CREDENTIAL_TOKEN]).map(str::to_string),
            timeout,
        )
    }

    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.auth_header, &self.token) {
            (Some(header), Some(token)) => request.header(header.as_str(), token.as_str()),
            (None, Some(token)) => request.bearer_auth(token),
            _ => request,
        }
    }

    async fn call(
        &self,
        action: &str,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> DnsResult<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, action);
        let request = self.client.post(&url);
        let request = match self.mode {
            WebhookMode::Default => request.json(&RecordMessage {
                fqdn: format!("{}.", challenge_record_fqdn(domain)),
                value: dns01_txt_value(key_authorization),
            }),
            WebhookMode::Raw => request.json(&RawMessage {
                domain,
                token,
                key_auth: key_authorization,
            }),
        };

        debug!(url = %url, domain = %domain, mode = ?self.mode, "Calling DNS webhook");

        self.add_auth(request)
            .send()
            .await
            .map_err(|e| map_request_error(e, "Webhook request failed", self.timeout_secs))
    }
}

#[async_trait]
impl DnsProvider for WebhookProvider {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn present(&self, domain: &str, token: &str, key_authorization: &str) -> DnsResult<()> {
        let response = self.call("present", domain, token, key_authorization).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordCreation {
                record_name: challenge_record_fqdn(domain),
                message: format!("HTTP {} - {}", status, body),
            });
        }
        Ok(())
    }

    async fn cleanup(&self, domain: &str, token: &str, key_authorization: &str) -> DnsResult<()> {
        let response = self.call("cleanup", domain, token, key_authorization).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordDeletion {
                record_name: challenge_record_fqdn(domain),
                message: format!("HTTP {} - {}", status, body),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RecordMessage {
    fqdn: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage<'a> {
    domain: &'a str,
    token: &'a str,
    key_auth: &'a str,
}
