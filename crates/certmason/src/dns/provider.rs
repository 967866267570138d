//! DNS provider capability for DNS-01 challenges
//!
//! A provider publishes `_acme-challenge.<domain>` TXT records and removes
//! them again. Providers receive the raw key authorization and derive the
//! record value themselves, so the ACME layer never needs to know how a
//! provider names or tracks its records.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Result type for DNS provider operations
pub type DnsResult<T> = Result<T, DnsProviderError>;

/// Errors raised by a bound DNS provider while solving a challenge
#[derive(Debug, Error)]
pub enum DnsProviderError {
    /// Authentication with the provider API was rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No zone managed by the provider covers the domain
    #[error("Zone not found for domain '{domain}'")]
    ZoneNotFound { domain: String },

    /// The provider refused to create the record
    #[error("Failed to create TXT record for '{record_name}': {message}")]
    RecordCreation { record_name: String, message: String },

    /// The provider refused to delete the record
    #[error("Failed to delete TXT record '{record_name}': {message}")]
    RecordDeletion { record_name: String, message: String },

    /// Transport-level API failure
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The provider API did not answer in time
    #[error("Request timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },

    /// The TXT record never became visible to the checked nameservers
    #[error("DNS propagation timeout for record '{record}' after {elapsed_secs}s")]
    PropagationTimeout { record: String, elapsed_secs: u64 },

    /// Missing or unusable provider settings
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// DNS-01 provider capability
///
/// Implementations must tolerate `cleanup` for a record they never created,
/// since cleanup also runs after partially failed presentations.
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    /// Registry key of the provider (e.g. "hetzner")
    fn name(&self) -> &'static str;

    /// Publish the TXT record proving control of `domain`
    async fn present(&self, domain: &str, token: &str, key_authorization: &str) -> DnsResult<()>;

    /// Remove the TXT record published by [`DnsProvider::present`]
    async fn cleanup(&self, domain: &str, token: &str, key_authorization: &str) -> DnsResult<()>;
}

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// TTL for challenge records
pub const CHALLENGE_TTL: u32 = 60;

/// Strip a wildcard label; wildcard names are validated on their base domain
pub fn normalize_domain(domain: &str) -> &str {
    let trimmed = domain.trim_end_matches('.');
    trimmed.strip_prefix("*.").unwrap_or(trimmed)
}

/// Full name of the challenge record for `domain`
///
/// `*.example.com` and `example.com` both map to `_acme-challenge.example.com`.
pub fn challenge_record_fqdn(domain: &str) -> String {
    format!("{}.{}", ACME_CHALLENGE_RECORD, normalize_domain(domain))
}

/// TXT record value for a key authorization: base64url(SHA-256(key_auth))
pub fn dns01_txt_value(key_authorization: &str) -> String {
    let digest = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Provider-side bookkeeping of records created during a pass
///
/// Keyed by record name and value, so two challenges for the same name
/// (e.g. `example.com` and `*.example.com`) keep distinct record IDs.
#[derive(Debug, Default)]
pub struct RecordBook {
    records: Mutex<HashMap<(String, String), String>>,
}

impl RecordBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the provider's ID for a created record
    pub fn insert(&self, fqdn: &str, value: &str, record_id: String) {
        self.records
            .lock()
            .insert((fqdn.to_string(), value.to_string()), record_id);
    }

    /// Forget a record and return its ID, if it was created by this provider
    pub fn take(&self, fqdn: &str, value: &str) -> Option<String> {
        self.records
            .lock()
            .remove(&(fqdn.to_string(), value.to_string()))
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// Map a reqwest transport error, distinguishing timeouts
pub(crate) fn map_request_error(
    err: reqwest::Error,
    what: &str,
    timeout_secs: u64,
) -> DnsProviderError {
    if err.is_timeout() {
        DnsProviderError::Timeout {
            elapsed_secs: timeout_secs,
        }
    } else {
        DnsProviderError::ApiRequest(format!("{}: {}", what, err))
    }
}
