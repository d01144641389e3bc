//! Construction-time configuration for the queue manager.
//!
//! Sources (applied in order, later sources override earlier ones):
//!  1. `config/queue-facade.yaml` (or the path given to [`ManagerConfig::load_from`])
//!  2. Environment variables prefixed `QUEUE_FACADE__`,
//!     e.g. `QUEUE_FACADE__ACCESS_KEY`
//!
//! Both credentials are required; [`ManagerConfig::validate`] reports the
//! first one that is missing.

use crate::error::ConfigurationError;
use serde::Deserialize;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default configuration file, resolved relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/queue-facade";

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "QUEUE_FACADE";

/// Secret credential value, wiped from memory on drop
///
/// Never included in Debug output or logs.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get credential as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("length", &self.0.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Queue manager configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Access key identifying the caller to the queue service
    pub access_key: Option<Credential>,

    /// Secret key paired with the access key
    pub secret_key: Option<Credential>,

    /// Prefix reserved for scoping table names; carried but not applied
    pub table_prefix: Option<String>,
}

impl ManagerConfig {
    /// Create configuration with both credentials set
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: Some(Credential::new(access_key)),
            secret_key: Some(Credential::new(secret_key)),
            table_prefix: None,
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from `path` (YAML, optional) and the environment
    pub fn load_from(path: &str) -> Result<Self, ConfigurationError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(path)
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })
    }

    /// Check that both credentials are present and non-empty
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (key, value) in [
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
        ] {
            if value.as_ref().map_or(true, Credential::is_empty) {
                return Err(ConfigurationError::Missing {
                    key: key.to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
