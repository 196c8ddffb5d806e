//! Logging configuration
//!
//! Controls the internal logging behavior of Satellite.

use serde::{Deserialize, Serialize};

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level - very verbose
    Trace,
    /// Debug level - debugging information
    Debug,
    /// Info level - normal operation (default)
    #[default]
    Info,
    /// Warn level - warnings only
    Warn,
    /// Error level - errors only
    Error,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output (default)
    #[default]
    Console,
    /// JSON structured logging
    Json,
}

/// Logger configuration
///
/// # Example
///
/// ```yaml
/// logger:
///   log_pattern: console
///   time_pattern: "%Y-%m-%d %H:%M:%S%.3f"
///   level: info
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggerConfig {
    /// Output format (console, json)
    /// Default: console
    #[serde(alias = "pattern")]
    pub log_pattern: LogFormat,

    /// strftime pattern for timestamps
    /// Default: "%Y-%m-%d %H:%M:%S%.3f"
    pub time_pattern: String,

    /// Log level (trace, debug, info, warn, error)
    /// Default: info
    pub level: LogLevel,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_pattern: LogFormat::Console,
            time_pattern: "%Y-%m-%d %H:%M:%S%.3f".into(),
            level: LogLevel::Info,
        }
    }
}
