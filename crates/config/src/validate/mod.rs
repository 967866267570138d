//! Configuration validation
//!
//! Required fields are checked first, in a fixed order, so that the error
//! always names the first missing one. Format checks run only once every
//! required field is present.

use url::Url;

use crate::{ConfigError, OperatorConfig};

pub const FIELD_EMAIL: &str = "email";
pub const FIELD_SERVER: &str = "server";
pub const FIELD_PLUGIN: &str = "plugin";
pub const FIELD_SECRET_ID: &str = "plugin-config-secret-id";

/// Validate an operator configuration
pub fn validate_config(config: &OperatorConfig) -> Result<(), ConfigError> {
    validate_required(config)?;
    validate_email(&config.email)?;
    validate_server(&config.server)?;
    validate_timeouts(config)?;
    Ok(())
}

fn validate_required(config: &OperatorConfig) -> Result<(), ConfigError> {
    let required = [
        (FIELD_EMAIL, config.email.trim().is_empty()),
        (FIELD_SERVER, config.server.trim().is_empty()),
        (FIELD_PLUGIN, config.plugin.trim().is_empty()),
        (FIELD_SECRET_ID, config.plugin_config_secret_id.as_str().trim().is_empty()),
    ];

    match required.iter().find(|(_, missing)| *missing) {
        Some((field, _)) => Err(ConfigError::missing(*field)),
        None => Ok(()),
    }
}

fn validate_email(email: &str) -> Result<(), ConfigError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ConfigError::Invalid {
            field: FIELD_EMAIL,
            reason: format!("'{}' is not an email address", email),
        }),
    }
}

fn validate_server(server: &str) -> Result<(), ConfigError> {
    let url = Url::parse(server).map_err(|e| ConfigError::Invalid {
        field: FIELD_SERVER,
        reason: format!("'{}' is not a valid URL: {}", server, e),
    })?;

    match url.scheme() {
        "https" | "http" => Ok(()),
        other => Err(ConfigError::Invalid {
            field: FIELD_SERVER,
            reason: format!("unsupported URL scheme '{}'", other),
        }),
    }
}

fn validate_timeouts(config: &OperatorConfig) -> Result<(), ConfigError> {
    if config.timeouts.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid {
            field: "timeouts.poll-interval-secs",
            reason: "must be greater than zero".to_string(),
        });
    }

    if config.propagation.verify && config.propagation.check_interval_secs == 0 {
        return Err(ConfigError::Invalid {
            field: "propagation.check-interval-secs",
            reason: "must be greater than zero when verify is enabled".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use certmason_common::SecretRef;
    use proptest::prelude::*;

    fn valid_config() -> OperatorConfig {
        OperatorConfig {
            email: "a@b.com".to_string(),
            server: "https://acme.example/directory".to_string(),
            plugin: "mock".to_string(),
            plugin_config_secret_id: SecretRef::new("secret/1"),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_server_named() {
        let config = OperatorConfig {
            server: String::new(),
            ..valid_config()
        };
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.field(), Some(FIELD_SERVER));
        insta::assert_snapshot!(err.to_string(), @"server config is invalid: value is empty");
    }

    #[test]
    fn test_first_missing_field_wins() {
        let config = OperatorConfig::default();
        assert_eq!(validate_config(&config).unwrap_err().field(), Some(FIELD_EMAIL));

        let config = OperatorConfig {
            email: "a@b.com".to_string(),
            ..Default::default()
        };
        assert_eq!(validate_config(&config).unwrap_err().field(), Some(FIELD_SERVER));

        let config = OperatorConfig {
            plugin: String::new(),
            plugin_config_secret_id: SecretRef::default(),
            ..valid_config()
        };
        assert_eq!(validate_config(&config).unwrap_err().field(), Some(FIELD_PLUGIN));

        let config = OperatorConfig {
            plugin_config_secret_id: SecretRef::default(),
            ..valid_config()
        };
        assert_eq!(validate_config(&config).unwrap_err().field(), Some(FIELD_SECRET_ID));
    }

    #[test]
    fn test_missing_server_reported_before_bad_email() {
        let config = OperatorConfig {
            email: "invalid-email".to_string(),
            server: String::new(),
            ..valid_config()
        };
        assert_eq!(validate_config(&config).unwrap_err().field(), Some(FIELD_SERVER));
    }

    #[test]
    fn test_bad_email_format() {
        let config = OperatorConfig {
            email: "invalid-email".to_string(),
            ..valid_config()
        };
        assert_eq!(validate_config(&config).unwrap_err().field(), Some(FIELD_EMAIL));
    }

    #[test]
    fn test_bad_server_url() {
        let config = OperatorConfig {
            server: "not a url".to_string(),
            ..valid_config()
        };
        assert_eq!(validate_config(&config).unwrap_err().field(), Some(FIELD_SERVER));

        let config = OperatorConfig {
            server: "ftp://acme.example/directory".to_string(),
            ..valid_config()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn test_zero_poll_interval() {
        let mut config = valid_config();
        config.timeouts.poll_interval_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.field(), Some("timeouts.poll-interval-secs"));
    }

    proptest! {
        #[test]
        fn prop_missing_email_or_server_always_invalid(
            blank_email in any::<bool>(),
            whitespace in "[ \t]{0,3}",
        ) {
            let mut config = valid_config();
            if blank_email {
                config.email = whitespace.clone();
            } else {
                config.server = whitespace.clone();
            }

            let err = validate_config(&config).unwrap_err();
            let expected = if blank_email { FIELD_EMAIL } else { FIELD_SERVER };
            prop_assert_eq!(err.field(), Some(expected));
        }
    }
}
