//! Cloudflare DNS provider
//!
//! Credentials: `CF_DNS_API_TOKEN` or `CLOUDFLARE_DNS_API_TOKEN` (required),
//! `CLOUDFLARE_ZONE_ID` (optional, skips zone lookup), `CLOUDFLARE_API_URL`
//! (optional endpoint override).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dns::credentials::CredentialSet;
use crate::dns::provider::{
    challenge_record_fqdn, dns01_txt_value, map_request_error, normalize_domain, DnsProvider,
    DnsProviderError, DnsResult, RecordBook, CHALLENGE_TTL,
};

const CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

pub const CREDENTIAL_TOKEN_KEYS: &[&str] = &["CF_DNS_API_TOKEN", "CLOUDFLARE_DNS_API_TOKEN"];
pub const CREDENTIAL_ZONE_ID: &str = "CLOUDFLARE_ZONE_ID";
pub const CREDENTIAL_API_URL: &str = "CLOUDFLARE_API_URL";

#[derive(Debug)]
pub struct CloudflareProvider {
    client: Client,
    base_url: String,
    timeout_secs: u64,
    fixed_zone_id: Option<String>,
    /// domain -> zone id
    zone_cache: RwLock<HashMap<String, String>>,
    records: RecordBook,
}

impl CloudflareProvider {
    pub fn new(
        api_token: &str,
        zone_id: Option<&str>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> DnsResult<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_token)).map_err(|_| {
            DnsProviderError::Configuration("API token contains invalid characters".to_string())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                DnsProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(CLOUDFLARE_API_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: timeout.as_secs(),
            fixed_zone_id: zone_id.map(str::to_string),
            zone_cache: RwLock::new(HashMap::new()),
            records: RecordBook::new(),
        })
    }

    pub fn from_credentials(credentials: &CredentialSet, timeout: Duration) -> DnsResult<Self> {
        let token = credentials.require(CREDENTIAL_TOKEN_KEYS)?;
        Self::new(
            token,
            credentials.first_of(&[CREDENTIAL_ZONE_ID]),
            credentials.first_of(&[CREDENTIAL_API_URL]),
            timeout,
        )
    }

    async fn zone_id_for(&self, domain: &str) -> DnsResult<String> {
        if let Some(zone_id) = &self.fixed_zone_id {
            return Ok(zone_id.clone());
        }

        let normalized = normalize_domain(domain);
        if let Some(zone_id) = self.zone_cache.read().get(normalized) {
            return Ok(zone_id.clone());
        }

        // Walk from the full name up to the registrable parent
        let labels: Vec<&str> = normalized.split('.').collect();
        for i in 0..labels.len().saturating_sub(1) {
            let zone_name = labels[i..].join(".");
            debug!(zone_name = %zone_name, "Looking up Cloudflare zone");

            let response = self
                .client
                .get(format!("{}/zones", self.base_url))
                .query(&[("name", zone_name.as_str())])
                .send()
                .await
                .map_err(|e| map_request_error(e, "Failed to look up zone", self.timeout_secs))?;

            let zones: Vec<Zone> = read_envelope(response, "zone lookup").await?;
            if let Some(zone) = zones.into_iter().find(|z| z.name == zone_name) {
                debug!(zone_id = %zone.id, zone_name = %zone.name, "Found Cloudflare zone");
                self.zone_cache
                    .write()
                    .insert(normalized.to_string(), zone.id.clone());
                return Ok(zone.id);
            }
        }

        Err(DnsProviderError::ZoneNotFound {
            domain: domain.to_string(),
        })
    }
}

/// Decode Cloudflare's `{success, errors, result}` envelope
async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> DnsResult<T> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DnsProviderError::Authentication(format!(
            "Cloudflare rejected the API token during {}",
            what
        )));
    }

    let body: Envelope<T> = response.json().await.map_err(|e| {
        DnsProviderError::ApiRequest(format!("Failed to parse {} response: {}", what, e))
    })?;

    match (body.success, body.result) {
        (true, Some(result)) => Ok(result),
        _ => {
            let errors = body
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join(", ");
            Err(DnsProviderError::ApiRequest(format!(
                "{} failed with HTTP {}: {}",
                what, status, errors
            )))
        }
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn present(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let zone_id = self.zone_id_for(domain).await?;
        let fqdn = challenge_record_fqdn(domain);
        let value = dns01_txt_value(key_authorization);

        debug!(record = %fqdn, zone_id = %zone_id, "Creating Cloudflare TXT record");

        let response = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .json(&CreateDnsRecord {
                record_type: "TXT",
                name: &fqdn,
                content: &value,
                ttl: CHALLENGE_TTL,
            })
            .send()
            .await
            .map_err(|e| map_request_error(e, "Failed to create record", self.timeout_secs))?;

        let created: DnsRecordResponse = read_envelope(response, "record creation")
            .await
            .map_err(|e| DnsProviderError::RecordCreation {
                record_name: fqdn.clone(),
                message: e.to_string(),
            })?;

        self.records
            .insert(&fqdn, &value, format!("{}/{}", zone_id, created.id));
        Ok(())
    }

    async fn cleanup(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let fqdn = challenge_record_fqdn(domain);
        let value = dns01_txt_value(key_authorization);

        let Some(handle) = self.records.take(&fqdn, &value) else {
            return Ok(());
        };
        let Some((zone_id, record_id)) = handle.split_once('/') else {
            return Ok(());
        };

        let response = self
            .client
            .delete(format!(
                "{}/zones/{}/dns_records/{}",
                self.base_url, zone_id, record_id
            ))
            .send()
            .await
            .map_err(|e| map_request_error(e, "Failed to delete record", self.timeout_secs))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "Record already deleted");
            return Ok(());
        }

        read_envelope::<DeleteResponse>(response, "record deletion")
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!(record = %fqdn, error = %e, "Failed to delete Cloudflare TXT record");
                DnsProviderError::RecordDeletion {
                    record_name: fqdn,
                    message: e.to_string(),
                }
            })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateDnsRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct DnsRecordResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[allow(dead_code)]
    id: String,
}
