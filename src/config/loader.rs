//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::BrokerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BrokerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<BrokerConfig, ConfigError> {
    let config: BrokerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::policy::RequeuePosition;
    use crate::routing::ExchangeKind;
    use std::io::Write;

    const TOPOLOGY: &str = r#"
        [delivery]
        max_redeliveries = 5
        requeue_position = "tail"

        [[exchanges]]
        name = "users"
        kind = "topic"

        [[queues]]
        name = "user-any-ok-q"

        [[bindings]]
        exchange = "users"
        queue = "user-any-ok-q"
        routing_key = "user.*.ok"
    "#;

    #[test]
    fn test_parse_topology() {
        let config = parse_config(TOPOLOGY).unwrap();
        assert_eq!(config.delivery.max_redeliveries, 5);
        assert_eq!(config.delivery.requeue_position, RequeuePosition::Tail);
        assert_eq!(config.exchanges[0].kind, ExchangeKind::Topic);
        assert_eq!(config.bindings[0].pattern, "user.*.ok");
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let err = parse_config(
            r#"
            [[exchanges]]
            name = "x"
            kind = "headers"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("unknown exchange kind 'headers'"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = parse_config(
            r#"
            [[bindings]]
            exchange = "ghost"
            queue = "q"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: binding #0 references unknown exchange 'ghost', binding #0 references unknown queue 'q'"
        );
    }

    #[test]
    fn test_bundled_config_is_valid() {
        let config = parse_config(include_str!("../../config/broker.toml")).unwrap();
        assert_eq!(config.exchanges.len(), 3);
        assert_eq!(config.queues.len(), 6);
        assert_eq!(config.bindings.len(), 6);
        assert!(config.admin.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOPOLOGY.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.queues.len(), 1);

        let missing = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
