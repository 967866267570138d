//! ACME block KDL parsing.

use std::net::IpAddr;
use tracing::trace;

use certmason_common::SecretRef;

use crate::{ConfigError, OperatorConfig, PropagationSettings, TimeoutConfig};

use super::helpers::{
    get_bool_entry, get_child, get_int_entry, get_repeated_strings, get_string_entry,
};

/// Parse the `acme` configuration block
///
/// Missing string keys are loaded as empty values so that validation, not
/// parsing, reports which required field is absent.
pub fn parse_acme_config(node: &::kdl::KdlNode) -> Result<OperatorConfig, ConfigError> {
    trace!("Parsing acme configuration block");

    let timeouts = match get_child(node, "timeouts") {
        Some(child) => parse_timeouts(child)?,
        None => TimeoutConfig::default(),
    };

    let propagation = match get_child(node, "propagation") {
        Some(child) => parse_propagation_settings(child)?,
        None => PropagationSettings::default(),
    };

    let config = OperatorConfig {
        email: get_string_entry(node, "email").unwrap_or_default(),
        server: get_string_entry(node, "server").unwrap_or_default(),
        plugin: get_string_entry(node, "plugin").unwrap_or_default(),
        plugin_config_secret_id: SecretRef::new(
            get_string_entry(node, "plugin-config-secret-id").unwrap_or_default(),
        ),
        export_credentials_env: get_bool_entry(node, "export-credentials-env").unwrap_or(false),
        timeouts,
        propagation,
    };

    trace!(
        plugin = %config.plugin,
        export_credentials_env = config.export_credentials_env,
        "Parsed acme configuration"
    );

    Ok(config)
}

/// Parse the `timeouts` block
pub fn parse_timeouts(node: &::kdl::KdlNode) -> Result<TimeoutConfig, ConfigError> {
    let defaults = TimeoutConfig::default();

    Ok(TimeoutConfig {
        order_ready_secs: get_secs(node, "order-ready-secs")?.unwrap_or(defaults.order_ready_secs),
        certificate_secs: get_secs(node, "certificate-secs")?.unwrap_or(defaults.certificate_secs),
        poll_interval_secs: get_secs(node, "poll-interval-secs")?
            .unwrap_or(defaults.poll_interval_secs),
        dns_api_secs: get_secs(node, "dns-api-secs")?.unwrap_or(defaults.dns_api_secs),
    })
}

/// Parse the `propagation` block
pub fn parse_propagation_settings(
    node: &::kdl::KdlNode,
) -> Result<PropagationSettings, ConfigError> {
    let defaults = PropagationSettings::default();

    let configured = get_repeated_strings(node, "nameserver");
    let system_resolver = get_bool_entry(node, "system-resolver").unwrap_or(false);
    let nameservers = if system_resolver {
        if !configured.is_empty() {
            return Err(ConfigError::Load(
                "'system-resolver' and 'nameserver' are mutually exclusive".to_string(),
            ));
        }
        Vec::new()
    } else if configured.is_empty() {
        defaults.nameservers
    } else {
        configured
            .iter()
            .map(|s| {
                s.parse::<IpAddr>().map_err(|e| {
                    ConfigError::Load(format!("Invalid nameserver address '{}': {}", s, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(PropagationSettings {
        initial_delay_secs: get_secs(node, "initial-delay-secs")?
            .unwrap_or(defaults.initial_delay_secs),
        check_interval_secs: get_secs(node, "check-interval-secs")?
            .unwrap_or(defaults.check_interval_secs),
        timeout_secs: get_secs(node, "timeout-secs")?.unwrap_or(defaults.timeout_secs),
        verify: get_bool_entry(node, "verify").unwrap_or(defaults.verify),
        nameservers,
    })
}

/// Read a non-negative number of seconds
fn get_secs(node: &::kdl::KdlNode, name: &str) -> Result<Option<u64>, ConfigError> {
    get_int_entry(node, name)
        .map(|v| {
            u64::try_from(v).map_err(|_| {
                ConfigError::Load(format!("'{}' must be a non-negative integer, got {}", name, v))
            })
        })
        .transpose()
}
