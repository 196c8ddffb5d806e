//! Native server configuration

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ServerError};

/// Configuration for the `native-server` sharing plugin
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NativeServerConfig {
    /// Listen address
    /// Default: 0.0.0.0:11800
    pub address: String,

    /// Accepted connections allowed at once; 0 disables the check
    /// Default: 5000
    pub max_connections: usize,

    /// Process CPU ceiling in percent of the whole machine; 0 disables
    /// Default: 75
    pub max_cpu_utilization: f64,

    /// How often process CPU is sampled
    /// Default: 5s
    #[serde(with = "satellite_config::duration")]
    pub cpu_sample_period: Duration,

    /// Per-connection read buffer
    /// Default: 65536
    pub read_buffer_size: usize,

    /// Default: true
    pub nodelay: bool,

    /// Default: true
    pub keepalive: bool,
}

impl Default for NativeServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:11800".into(),
            max_connections: 5000,
            max_cpu_utilization: 75.0,
            cpu_sample_period: Duration::from_secs(5),
            read_buffer_size: 64 * 1024,
            nodelay: true,
            keepalive: true,
        }
    }
}

impl NativeServerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    #[must_use]
    pub fn with_max_cpu_utilization(mut self, percent: f64) -> Self {
        self.max_cpu_utilization = percent;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(ServerError::InvalidConfig("address is required".into()));
        }
        if !(0.0..=100.0).contains(&self.max_cpu_utilization) {
            return Err(ServerError::InvalidConfig(format!(
                "max_cpu_utilization must be within 0..=100, got {}",
                self.max_cpu_utilization
            )));
        }
        if self.cpu_sample_period.is_zero() {
            return Err(ServerError::InvalidConfig(
                "cpu_sample_period must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
