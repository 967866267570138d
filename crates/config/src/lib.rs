//! Configuration loading and validation for certmason
//!
//! The operator configuration is a small KDL document with a single `acme`
//! block. It is rebuilt from the host on every reconciliation pass and is
//! never mutated afterwards.
//!
//! # Example
//!
//! ```kdl
//! acme {
//!     email "admin@example.com"
//!     server "https://acme-staging-v02.api.letsencrypt.org/directory"
//!     plugin "hetzner"
//!     plugin-config-secret-id "dns-credentials"
//!
//!     timeouts {
//!         order-ready-secs 120
//!         certificate-secs 60
//!         poll-interval-secs 2
//!         dns-api-secs 30
//!     }
//!
//!     propagation {
//!         initial-delay-secs 10
//!         check-interval-secs 5
//!         timeout-secs 120
//!         verify #true
//!         nameserver "1.1.1.1"
//!     }
//! }
//! ```

pub mod kdl;
pub mod validate;

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use certmason_common::SecretRef;

pub use validate::{FIELD_EMAIL, FIELD_PLUGIN, FIELD_SECRET_ID, FIELD_SERVER};

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration source could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// A field is missing or has an unusable value
    #[error("{field} config is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn missing(field: &'static str) -> Self {
        ConfigError::Invalid {
            field,
            reason: "value is empty".to_string(),
        }
    }

    /// Name of the offending field for `Invalid` errors
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::Invalid { field, .. } => Some(field),
            ConfigError::Load(_) => None,
        }
    }
}

/// Validated snapshot of the operator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Contact email for the ACME account
    pub email: String,
    /// ACME directory URL
    pub server: String,
    /// DNS provider plugin identifier
    pub plugin: String,
    /// Reference to the secret holding the DNS provider credentials
    pub plugin_config_secret_id: SecretRef,
    /// Export resolved credentials to the process environment for the pass
    #[serde(default)]
    pub export_credentials_env: bool,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub propagation: PropagationSettings,
}

/// Bounds on every blocking ACME and DNS interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Maximum wait for all authorizations to validate
    pub order_ready_secs: u64,
    /// Maximum wait for the CA to issue after finalization
    pub certificate_secs: u64,
    /// Delay between order status polls
    pub poll_interval_secs: u64,
    /// HTTP timeout for DNS provider API calls
    pub dns_api_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            order_ready_secs: default_order_ready_secs(),
            certificate_secs: default_certificate_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            dns_api_secs: default_dns_api_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn order_ready(&self) -> Duration {
        Duration::from_secs(self.order_ready_secs)
    }

    pub fn certificate(&self) -> Duration {
        Duration::from_secs(self.certificate_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dns_api(&self) -> Duration {
        Duration::from_secs(self.dns_api_secs)
    }
}

/// DNS propagation checking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationSettings {
    /// Delay after creating a record before the first check
    pub initial_delay_secs: u64,
    /// Interval between TXT lookups
    pub check_interval_secs: u64,
    /// Maximum time to wait for the record to appear
    pub timeout_secs: u64,
    /// Query nameservers for the record instead of only sleeping
    pub verify: bool,
    /// Nameservers to query; empty uses the host's resolver configuration
    /// (`system-resolver #true` in KDL)
    pub nameservers: Vec<IpAddr>,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: 10,
            check_interval_secs: 5,
            timeout_secs: 120,
            verify: true,
            nameservers: vec![
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            ],
        }
    }
}

pub(crate) fn default_order_ready_secs() -> u64 {
    120
}

pub(crate) fn default_certificate_secs() -> u64 {
    60
}

pub(crate) fn default_poll_interval_secs() -> u64 {
    2
}

pub(crate) fn default_dns_api_secs() -> u64 {
    30
}

impl OperatorConfig {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Load(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = Self::from_kdl(&content)?;
        info!(path = %path.display(), plugin = %config.plugin, "Loaded operator configuration");
        Ok(config)
    }

    /// Parse configuration from KDL content
    pub fn from_kdl(content: &str) -> Result<Self, ConfigError> {
        let doc: ::kdl::KdlDocument = content
            .parse()
            .map_err(|e: ::kdl::KdlError| ConfigError::Load(render_kdl_error(content, &e)))?;

        let config = kdl::parse_kdl_document(&doc)?;
        debug!(
            email = %config.email,
            server = %config.server,
            plugin = %config.plugin,
            "Parsed KDL configuration"
        );
        Ok(config)
    }

    /// Validate required fields, in order, before any network interaction
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate::validate_config(self)
    }
}

/// Render a KDL parse error with line/column context
fn render_kdl_error(content: &str, err: &::kdl::KdlError) -> String {
    use miette::Diagnostic;

    let mut message = String::from("KDL configuration parse error:\n");
    let mut found_details = false;

    if let Some(related) = err.related() {
        for diagnostic in related {
            message.push_str(&format!("  {}\n", diagnostic));
            found_details = true;

            if let Some(labels) = diagnostic.labels() {
                for label in labels {
                    let (line, col) = kdl::offset_to_line_col(content, label.offset());
                    message.push_str(&format!("  --> at line {}, column {}\n", line, col));
                }
            }
        }
    }

    if !found_details {
        message.push_str(&format!("  {}\n", err));
    }

    message
}
