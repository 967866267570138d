//! Hetzner DNS provider
//!
//! API documentation: <https://dns.hetzner.com/api-docs>
//!
//! Credentials: `HETZNER_API_KEY` (required), `HETZNER_API_URL` (optional
//! endpoint override).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dns::credentials::CredentialSet;
use crate::dns::provider::{
    challenge_record_fqdn, dns01_txt_value, map_request_error, normalize_domain, DnsProvider,
    DnsProviderError, DnsResult, RecordBook, CHALLENGE_TTL,
};

/// Hetzner DNS API base URL
const HETZNER_API_BASE: &str = "https://dns.hetzner.com/api/v1";

pub const CREDENTIAL_API_KEY: &str = "HETZNER_API_KEY";
pub const CREDENTIAL_API_URL: &str = "HETZNER_API_URL";

#[derive(Debug)]
pub struct HetznerProvider {
    client: Client,
    base_url: String,
    token: String,
    timeout_secs: u64,
    /// domain -> zone
    zone_cache: RwLock<HashMap<String, Zone>>,
    records: RecordBook,
}

impl HetznerProvider {
    pub fn new(token: &str, base_url: Option<&str>, timeout: Duration) -> DnsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(HETZNER_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            token: token.to_string(),
            timeout_secs: timeout.as_secs(),
            zone_cache: RwLock::new(HashMap::new()),
            records: RecordBook::new(),
        })
    }

    pub fn from_credentials(credentials: &CredentialSet, timeout: Duration) -> DnsResult<Self> {
        let token = credentials.require(&[CREDENTIAL_API_KEY])?;
        Self::new(token, credentials.get(CREDENTIAL_API_URL), timeout)
    }

    async fn zone_for(&self, domain: &str) -> DnsResult<Zone> {
        let normalized = normalize_domain(domain);

        if let Some(zone) = self.zone_cache.read().get(normalized) {
            trace!(domain = %domain, zone_id = %zone.id, "Zone found in cache");
            return Ok(zone.clone());
        }

        let zones = self.list_zones().await?;
        let zone = find_matching_zone(normalized, &zones)
            .cloned()
            .ok_or_else(|| DnsProviderError::ZoneNotFound {
                domain: domain.to_string(),
            })?;

        self.zone_cache
            .write()
            .insert(normalized.to_string(), zone.clone());

        debug!(domain = %domain, zone_id = %zone.id, zone_name = %zone.name, "Found zone for domain");
        Ok(zone)
    }

    async fn list_zones(&self) -> DnsResult<Vec<Zone>> {
        let response = self
            .client
            .get(format!("{}/zones", self.base_url))
            .header("Auth-API-Token", &self.token)
            .send()
            .await
            .map_err(|e| map_request_error(e, "Failed to list zones", self.timeout_secs))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(DnsProviderError::Authentication(
                "Invalid Hetzner API token".to_string(),
            ));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::ApiRequest(format!(
                "Failed to list zones: HTTP {} - {}",
                status, body
            )));
        }

        let zones: ZonesResponse = response.json().await.map_err(|e| {
            DnsProviderError::ApiRequest(format!("Failed to parse zones response: {}", e))
        })?;
        Ok(zones.zones)
    }
}

/// Longest zone that is the domain itself or one of its parents
fn find_matching_zone<'a>(domain: &str, zones: &'a [Zone]) -> Option<&'a Zone> {
    let mut current = domain;
    loop {
        if let Some(zone) = zones.iter().find(|z| z.name == current) {
            return Some(zone);
        }
        let (_, parent) = current.split_once('.')?;
        current = parent;
    }
}

/// Record name relative to its zone (`@` for the apex)
fn relative_record_name(fqdn: &str, zone_name: &str) -> String {
    if fqdn == zone_name {
        "@".to_string()
    } else if let Some(stripped) = fqdn.strip_suffix(&format!(".{}", zone_name)) {
        stripped.to_string()
    } else {
        fqdn.to_string()
    }
}

#[async_trait]
impl DnsProvider for HetznerProvider {
    fn name(&self) -> &'static str {
        "hetzner"
    }

    async fn present(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let zone = self.zone_for(domain).await?;
        let fqdn = challenge_record_fqdn(domain);
        let value = dns01_txt_value(key_authorization);
        let name = relative_record_name(&fqdn, &zone.name);

        debug!(domain = %domain, zone_id = %zone.id, record_name = %name, "Creating TXT record");

        let request = CreateRecordRequest {
            zone_id: &zone.id,
            name: &name,
            r#type: "TXT",
            value: &value,
            ttl: CHALLENGE_TTL,
        };

        let response = self
            .client
            .post(format!("{}/records", self.base_url))
            .header("Auth-API-Token", &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_request_error(e, "Failed to create record", self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordCreation {
                record_name: fqdn,
                message: format!("HTTP {} - {}", status, body),
            });
        }

        let created: RecordResponse =
            response
                .json()
                .await
                .map_err(|e| DnsProviderError::RecordCreation {
                    record_name: fqdn.clone(),
                    message: format!("Failed to parse response: {}", e),
                })?;

        debug!(record_id = %created.record.id, "TXT record created");
        self.records.insert(&fqdn, &value, created.record.id);
        Ok(())
    }

    async fn cleanup(&self, domain: &str, _token: &str, key_authorization: &str) -> DnsResult<()> {
        let fqdn = challenge_record_fqdn(domain);
        let value = dns01_txt_value(key_authorization);

        let Some(record_id) = self.records.take(&fqdn, &value) else {
            debug!(record = %fqdn, "No record to clean up");
            return Ok(());
        };

        debug!(record_id = %record_id, "Deleting TXT record");

        let response = self
            .client
            .delete(format!("{}/records/{}", self.base_url, record_id))
            .header("Auth-API-Token", &self.token)
            .send()
            .await
            .map_err(|e| map_request_error(e, "Failed to delete record", self.timeout_secs))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "Record already deleted");
            return Ok(());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DnsProviderError::RecordDeletion {
                record_name: fqdn,
                message: format!("HTTP {} - {}", status, body),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    zones: Vec<Zone>,
}

#[derive(Debug, Clone, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    zone_id: &'a str,
    name: &'a str,
    r#type: &'a str,
    value: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    record: Record,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> Vec<Zone> {
        vec![
            Zone {
                id: "z1".to_string(),
                name: "example.com".to_string(),
            },
            Zone {
                id: "z2".to_string(),
                name: "dev.example.com".to_string(),
            },
        ]
    }

    #[test]
    fn test_find_matching_zone_prefers_closest() {
        let zones = zones();
        assert_eq!(find_matching_zone("example.com", &zones).unwrap().id, "z1");
        assert_eq!(find_matching_zone("api.example.com", &zones).unwrap().id, "z1");
        assert_eq!(find_matching_zone("a.dev.example.com", &zones).unwrap().id, "z2");
        assert!(find_matching_zone("example.org", &zones).is_none());
    }

    #[test]
    fn test_relative_record_name() {
        assert_eq!(
            relative_record_name("_acme-challenge.example.com", "example.com"),
            "_acme-challenge"
        );
        assert_eq!(
            relative_record_name("_acme-challenge.api.example.com", "example.com"),
            "_acme-challenge.api"
        );
        assert_eq!(relative_record_name("example.com", "example.com"), "@");
    }

    #[test]
    fn test_requires_api_key() {
        let creds = CredentialSet::from_pairs([("other", "x")]).unwrap();
        let err = HetznerProvider::from_credentials(&creds, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, DnsProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_cleanup_without_present_is_noop() {
        let provider = HetznerProvider::new("t", Some("http://127.0.0.1:9"), Duration::from_secs(1))
            .unwrap();
        assert!(provider.cleanup("example.com", "tok", "ka").await.is_ok());
    }
}
