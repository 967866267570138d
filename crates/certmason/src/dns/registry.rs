//! Plugin registry mapping plugin ids to DNS provider constructors
//!
//! The configured `plugin` value is looked up here once per pass. Built-in
//! providers are registered by [`ProviderRegistry::with_builtin`]; callers
//! may add their own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use certmason_config::{OperatorConfig, PropagationSettings};

use super::credentials::CredentialSet;
use super::error::DnsError;
use super::provider::{DnsProvider, DnsResult};
use super::providers::{CloudflareProvider, HetznerProvider, WebhookProvider};

/// Settings passed to every provider constructor
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// HTTP timeout for provider API calls
    pub api_timeout: Duration,
    pub propagation: PropagationSettings,
}

impl ProviderSettings {
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self {
            api_timeout: config.timeouts.dns_api(),
            propagation: config.propagation.clone(),
        }
    }
}

/// Builds a provider from resolved credentials
pub type ProviderConstructor =
    Box<dyn Fn(&CredentialSet, &ProviderSettings) -> DnsResult<Arc<dyn DnsProvider>> + Send + Sync>;

pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    /// Registry without any providers
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the built-in providers
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("hetzner", |creds, settings| {
            Ok(Arc::new(HetznerProvider::from_credentials(
                creds,
                settings.api_timeout,
            )?))
        });
        registry.register("cloudflare", |creds, settings| {
            Ok(Arc::new(CloudflareProvider::from_credentials(
                creds,
                settings.api_timeout,
            )?))
        });
        registry.register("webhook", |creds, settings| {
            Ok(Arc::new(WebhookProvider::from_credentials(
                creds,
                settings.api_timeout,
            )?))
        });
        registry
    }

    /// Register a constructor, replacing any previous one with the same id
    pub fn register<F>(&mut self, plugin_id: impl Into<String>, constructor: F)
    where
        F: Fn(&CredentialSet, &ProviderSettings) -> DnsResult<Arc<dyn DnsProvider>>
            + Send
            + Sync
            + 'static,
    {
        let plugin_id = plugin_id.into();
        if self
            .constructors
            .insert(plugin_id.clone(), Box::new(constructor))
            .is_some()
        {
            warn!(plugin = %plugin_id, "Replaced previously registered DNS provider");
        }
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.constructors.contains_key(plugin_id)
    }

    /// Registered plugin ids, sorted
    pub fn plugin_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Construct the provider registered under `plugin_id`
    pub fn create(
        &self,
        plugin_id: &str,
        credentials: &CredentialSet,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn DnsProvider>, DnsError> {
        let constructor =
            self.constructors
                .get(plugin_id)
                .ok_or_else(|| DnsError::UnsupportedPlugin {
                    plugin_id: plugin_id.to_string(),
                })?;

        let provider = constructor(credentials, settings).map_err(|source| DnsError::ProviderInit {
            plugin_id: plugin_id.to_string(),
            source,
        })?;

        debug!(plugin = %plugin_id, provider = provider.name(), "Constructed DNS provider");
        Ok(provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("plugins", &self.plugin_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ProviderSettings {
        ProviderSettings::from_config(&OperatorConfig::default())
    }

    #[test]
    fn test_builtin_plugins() {
        let registry = ProviderRegistry::default();
        assert_eq!(registry.plugin_ids(), vec!["cloudflare", "hetzner", "webhook"]);
    }

    #[test]
    fn test_unknown_plugin() {
        let registry = ProviderRegistry::with_builtin();
        let creds = CredentialSet::default();
        let err = registry
            .create("route53-but-misspelled", &creds, &settings())
            .unwrap_err();
        assert!(
            matches!(err, DnsError::UnsupportedPlugin { ref plugin_id } if plugin_id == "route53-but-misspelled")
        );
    }

    #[test]
    fn test_missing_credentials_is_provider_init() {
        let registry = ProviderRegistry::with_builtin();
        let creds = CredentialSet::default();
        let err = registry.create("hetzner", &creds, &settings()).unwrap_err();
        assert!(matches!(err, DnsError::ProviderInit { ref plugin_id, .. } if plugin_id == "hetzner"));
    }

    #[test]
    fn test_builtin_construction() {
        let registry = ProviderRegistry::with_builtin();
        let creds = CredentialSet::from_pairs([("hetzner-api-key", "k")]).unwrap();
        let provider = registry.create("hetzner", &creds, &settings()).unwrap();
        assert_eq!(provider.name(), "hetzner");
    }

    #[test]
    fn test_settings_from_config() {
        let settings = settings();
        assert_eq!(settings.api_timeout, Duration::from_secs(30));
        assert!(settings.propagation.verify);
    }
}
