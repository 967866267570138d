//! DNS provider credential resolution
//!
//! Credentials are read once per pass from the host's secret store and
//! normalized to the environment-variable spelling DNS providers document
//! (`aws-access-key-id` becomes `AWS_ACCESS_KEY_ID`). The resolved set is
//! handed straight to the provider constructor. Exporting it to the process
//! environment is opt-in and scoped by [`EnvScope`].

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use certmason_common::SecretRef;

use super::error::DnsError;
use super::provider::{DnsProviderError, DnsResult};
use crate::host::SecretStore;

/// Normalize a credential key: uppercase, `-` replaced by `_`
pub fn normalize_key(key: &str) -> String {
    key.to_uppercase().replace('-', "_")
}

/// Ordered map of normalized credential keys to secret values
///
/// `Debug` prints keys only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    entries: BTreeMap<String, String>,
}

impl CredentialSet {
    /// Build a set from raw key/value pairs, normalizing every key
    ///
    /// Fails with [`DnsError::CredentialCollision`] if two distinct input
    /// keys normalize to the same name.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, DnsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut entries = BTreeMap::new();
        for (key, value) in pairs {
            let normalized = normalize_key(key.as_ref());
            if entries.insert(normalized.clone(), value.into()).is_some() {
                return Err(DnsError::CredentialCollision { key: normalized });
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// First non-empty value among `keys`, in order
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.is_empty())
    }

    /// Required value; the error names every accepted key
    pub fn require(&self, keys: &[&str]) -> DnsResult<&str> {
        self.first_of(keys).ok_or_else(|| {
            DnsProviderError::Configuration(format!(
                "missing credential, expected one of: {}",
                keys.join(", ")
            ))
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Resolves the configured secret into a [`CredentialSet`]
pub struct CredentialResolver<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    pub fn resolve(&self, secret: &SecretRef) -> Result<CredentialSet, DnsError> {
        let unavailable = |reason: String| DnsError::SecretUnavailable {
            secret_id: secret.to_string(),
            reason,
        };

        let content = self
            .store
            .secret(secret)
            .map_err(|e| unavailable(e.to_string()))?
            .ok_or_else(|| unavailable("secret not found".to_string()))?;

        let credentials = CredentialSet::from_pairs(content)?;
        warn_on_blank_values(&credentials);
        debug!(
            secret_id = %secret,
            keys = ?credentials,
            "Resolved DNS provider credentials"
        );
        Ok(credentials)
    }
}

/// Process-environment export of a credential set for one pass
///
/// Previous values are restored (or removed) when the guard drops. The
/// environment is process-global, so at most one scope may be live.
#[must_use = "credentials are removed from the environment when the scope is dropped"]
pub struct EnvScope {
    previous: Vec<(String, Option<String>)>,
}

impl EnvScope {
    pub fn export(credentials: &CredentialSet) -> Self {
        let mut previous = Vec::with_capacity(credentials.len());
        for (key, value) in credentials.iter() {
            previous.push((key.to_string(), std::env::var(key).ok()));
            std::env::set_var(key, value);
        }
        debug!(count = previous.len(), "Exported DNS credentials to environment");
        Self { previous }
    }
}

impl Drop for EnvScope {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(&key, v),
                None => std::env::remove_var(&key),
            }
        }
    }
}

impl fmt::Debug for EnvScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvScope")
            .field("keys", &self.previous.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

fn warn_on_blank_values(credentials: &CredentialSet) {
    for (key, value) in credentials.iter() {
        if value.trim().is_empty() {
            warn!(key = %key, "DNS credential has an empty value");
        }
    }
}
