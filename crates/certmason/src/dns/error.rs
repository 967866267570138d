//! Errors raised while resolving credentials and binding a DNS provider

use thiserror::Error;

use super::provider::DnsProviderError;

/// Pass-fatal DNS setup errors
///
/// Each of these prevents the pass from processing any certificate request.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The credential secret could not be read from the host
    #[error("DNS provider credentials '{secret_id}' are unavailable: {reason}")]
    SecretUnavailable { secret_id: String, reason: String },

    /// Two credential keys normalize to the same name
    #[error("credential key '{key}' is defined more than once after normalization")]
    CredentialCollision { key: String },

    /// No provider is registered under the configured plugin id
    #[error("DNS plugin '{plugin_id}' is not supported")]
    UnsupportedPlugin { plugin_id: String },

    /// The provider could not be constructed from the resolved credentials
    #[error("failed to initialize DNS provider '{plugin_id}': {source}")]
    ProviderInit {
        plugin_id: String,
        #[source]
        source: DnsProviderError,
    },
}
