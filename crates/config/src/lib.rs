//! Satellite Configuration
//!
//! YAML-based configuration loading with environment expansion.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use satellite_config::Config;
//! use std::str::FromStr;
//!
//! let yaml = r#"
//! pipes:
//!   - common_config:
//!       pipe_name: selfmeter
//!     gatherer:
//!       fetcher:
//!         plugin_name: self-meter
//!     sender:
//!       forwarders:
//!         - plugin_name: native-forwarder
//! "#;
//! let config = Config::from_str(yaml).unwrap();
//! assert_eq!(config.pipes.len(), 1);
//! ```
//!
//! # Environment Expansion
//!
//! Any string value of the form `${NAME:default}` is replaced before the
//! config is deserialized. See the `env` module for coercion rules.
//!
//! # Example Full Config
//!
//! See `configs/satellite_config.yaml` for all available options.

pub mod duration;
pub mod env;
mod error;
mod logging;
mod pipe;
mod plugin;
mod telemetry;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogFormat, LogLevel, LoggerConfig};
pub use pipe::{
    CommonConfig, GathererConfig, PipeConfig, ProcessorConfig, SenderConfig, SharingConfig,
};
pub use plugin::{PLUGIN_NAME_KEY, PluginConfig};
pub use telemetry::{MetricsFormat, TelemetryConfig};

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logger: LoggerConfig,

    /// Self-telemetry configuration
    pub telemetry: TelemetryConfig,

    /// Process-wide shared clients and servers
    pub sharing: SharingConfig,

    /// Pipelines
    pub pipes: Vec<PipeConfig>,
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid YAML, references
    /// an unset environment variable without default, or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a YAML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(s)?;
        if value.is_null() {
            value = serde_yaml::Value::Mapping(Default::default());
        }
        env::expand_value(&mut value)?;
        let config: Config = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Names of all configured pipes, in declaration order
    pub fn pipe_names(&self) -> Vec<&str> {
        self.pipes.iter().map(PipeConfig::name).collect()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
