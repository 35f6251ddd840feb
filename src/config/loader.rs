//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ObserverConfig;
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

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ObserverConfig, ConfigError> {
    let config: ObserverConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ObserverConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Read a TOML file without validating it, for callers that still apply
/// overrides before [`validate_config`].
pub fn read_config(path: &Path) -> Result<ObserverConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputMode;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [upstream]
            todo_url = "http://127.0.0.1:9000/todos/1"

            [observability]
            output = "tracing"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.todo_url, "http://127.0.0.1:9000/todos/1");
        assert_eq!(config.upstream.timeout_secs, 10);
        assert_eq!(config.observability.output, OutputMode::Tracing);
        assert_eq!(config.listener.bind_address, "127.0.0.1:5000");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = parse_config("[upstream]\ntimeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert_eq!(
            err.to_string(),
            "Validation failed: upstream.timeout_secs must be greater than zero"
        );
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "http-observers-config-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[listener]\nbind_address = \"0.0.0.0:8088\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8088");

        fs::remove_file(&path).unwrap_or_default();
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_overrides_applied_before_validation() {
        let path = std::env::temp_dir().join(format!(
            "http-observers-override-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[listener]\nbind_address = \"not-an-address\"\n").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));

        let mut config = read_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "not-an-address");
        config.listener.bind_address = "127.0.0.1:6000".into();
        assert!(validate_config(&config).is_ok());

        fs::remove_file(&path).unwrap_or_default();
    }
}
