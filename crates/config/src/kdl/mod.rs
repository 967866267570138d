//! KDL configuration parsing.
//!
//! - `helpers`: Common parsing utility functions
//! - `acme`: The `acme` block and its `timeouts`/`propagation` children

mod acme;
mod helpers;

pub use acme::{parse_acme_config, parse_propagation_settings, parse_timeouts};
pub use helpers::{
    get_bool_entry, get_child, get_int_entry, get_repeated_strings,
    get_string_entry, offset_to_line_col,
};

use crate::{ConfigError, OperatorConfig};

/// Convert a parsed KDL document to an [`OperatorConfig`]
pub fn parse_kdl_document(doc: &::kdl::KdlDocument) -> Result<OperatorConfig, ConfigError> {
    let mut acme = None;

    for node in doc.nodes() {
        match node.name().value() {
            "acme" => {
                if acme.is_some() {
                    return Err(ConfigError::Load(
                        "Duplicate 'acme' configuration block".to_string(),
                    ));
                }
                acme = Some(parse_acme_config(node)?);
            }
            other => {
                return Err(ConfigError::Load(format!(
                    "Unknown top-level configuration block: '{}'\nValid blocks are: acme",
                    other
                )));
            }
        }
    }

    acme.ok_or_else(|| {
        ConfigError::Load(
            "Missing required 'acme' configuration block\n\
             Example:\n\
             acme {\n\
                 email \"admin@example.com\"\n\
                 server \"https://acme-v02.api.letsencrypt.org/directory\"\n\
                 plugin \"hetzner\"\n\
                 plugin-config-secret-id \"dns-credentials\"\n\
             }"
            .to_string(),
        )
    })
}
