//! Metrics sinks
//!
//! The core only depends on `MetricsSink`; which exporter is active is a
//! configuration choice (`telemetry.export_type`) resolved by the runtime's
//! plugin registry.

use satellite_config::MetricsFormat;
use thiserror::Error;
use tracing::info;

use crate::format::{HumanFormatter, JsonFormatter, MetricsFormatter};
use crate::MetricsSnapshot;

/// Errors from metrics setup
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Reporter built without a required part
    #[error("metrics reporter is missing {0}")]
    Incomplete(&'static str),
}

/// Destination for periodic metric snapshots
pub trait MetricsSink: Send + Sync {
    /// Exporter name
    fn name(&self) -> &'static str;

    /// Whether the reporter should bother sampling
    fn is_enabled(&self) -> bool {
        true
    }

    /// Export one snapshot
    fn export(&self, snapshot: &MetricsSnapshot, previous: Option<&MetricsSnapshot>);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneSink;

impl MetricsSink for NoneSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn export(&self, _snapshot: &MetricsSnapshot, _previous: Option<&MetricsSnapshot>) {}
}

/// Sink that writes snapshots through `tracing`
pub struct LogSink {
    formatter: Box<dyn MetricsFormatter>,
}

impl LogSink {
    pub fn new(format: MetricsFormat) -> Self {
        let formatter: Box<dyn MetricsFormatter> = match format {
            MetricsFormat::Human => Box::new(HumanFormatter::new()),
            MetricsFormat::Json => Box::new(JsonFormatter::new()),
        };
        Self { formatter }
    }
}

impl MetricsSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn export(&self, snapshot: &MetricsSnapshot, previous: Option<&MetricsSnapshot>) {
        let output = self.formatter.format(snapshot, previous);
        for line in output.lines() {
            info!(target: "satellite::metrics", "{}", line);
        }
    }
}

/// Build the sink named by `telemetry.export_type`
#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsRegistry;
    use satellite_config::TelemetryConfig;

    #[test]
    fn test_none_sink_disabled() {
        assert_eq!(NoneSink.name(), "none");
        assert!(!NoneSink.is_enabled());
    }

    #[test]
    fn test_log_sink_exports_without_previous() {
        let sink = LogSink::new(MetricsFormat::Json);
        assert_eq!(sink.name(), "log");
        assert!(sink.is_enabled());

        let registry = MetricsRegistry::new(&TelemetryConfig::default());
        registry.counter("pipe_received_events", &[("pipe", "trace")]).add(3);
        let snapshot: MetricsSnapshot = registry.snapshot();
        sink.export(&snapshot, None);
        sink.export(&snapshot, Some(&snapshot));
    }
}
