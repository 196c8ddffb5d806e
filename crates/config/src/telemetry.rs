//! Self-telemetry configuration
//!
//! Controls how Satellite reports its own counters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metrics output format for the `log` exporter
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// JSON structured output
    Json,
}

/// Telemetry configuration
///
/// # Example
///
/// ```yaml
/// telemetry:
///   cluster: default-cluster
///   service: default-service
///   instance: default-instance
///   export_type: log
///   interval: 60s
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Cluster label attached to every sample
    pub cluster: String,

    /// Service label attached to every sample
    pub service: String,

    /// Instance label attached to every sample
    pub instance: String,

    /// Metrics sink name (none, log)
    /// Default: none
    pub export_type: String,

    /// Export interval
    /// Default: 60s
    #[serde(with = "crate::duration")]
    pub interval: Duration,

    /// Output format for the log exporter
    /// Default: human
    pub format: MetricsFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            cluster: "default-cluster".into(),
            service: "default-service".into(),
            instance: "default-instance".into(),
            export_type: "none".into(),
            interval: Duration::from_secs(60),
            format: MetricsFormat::Human,
        }
    }
}
