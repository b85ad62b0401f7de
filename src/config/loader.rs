//! Configuration loading from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, ServiceDefinition};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration for the first start, falling back to defaults when
/// the file does not exist.
pub fn load_initial_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    match load_config(path) {
        Err(ConfigError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "No configuration file found, using default configuration");
            Ok(GatewayConfig::default())
        }
        other => other,
    }
}

/// Parse and validate configuration text.
///
/// Each entry of the `services` table is decoded on its own. An entry that
/// fails to decode is logged as a `ConfigurationError` and left out; the
/// rest of the configuration is unaffected.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let mut table: toml::Table = content.parse()?;
    let services = table.remove("services");

    let mut config: GatewayConfig = toml::Value::Table(table).try_into()?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    match services {
        Some(toml::Value::Table(entries)) => {
            for (name, value) in entries {
                match value.try_into::<ServiceDefinition>() {
                    Ok(definition) => {
                        config.services.insert(name, definition);
                    }
                    Err(e) => {
                        tracing::error!(
                            service = %name,
                            error = %e.message(),
                            "ConfigurationError: service skipped"
                        );
                    }
                }
            }
        }
        Some(_) => {
            tracing::error!("ConfigurationError: 'services' must be a table, no services loaded");
        }
        None => {}
    }

    Ok(config)
}
