//! Configuration loading from disk and the environment.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("environment variable {0} must hold a non-empty upload secret")]
    MissingSecret(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The shared upload token.
///
/// Never empty. `Debug` output is redacted so the value cannot leak through
/// logs or error chains.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value. Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Read the secret from the named environment variable.
    pub fn from_env(var: &str) -> Result<Self, ConfigError> {
        std::env::var(var)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| ConfigError::MissingSecret(var.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Load and validate configuration.
///
/// Without a path the built-in defaults are used; they are validated all the
/// same.
pub fn load_config(path: Option<&Path>) -> Result<GateConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GateConfig::default(),
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
