//! Periodic metrics reporter
//!
//! Snapshots the registry on a fixed interval and hands each snapshot,
//! together with the previous one for rate computation, to the sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{MetricsError, MetricsRegistry, MetricsSink, MetricsSnapshot};

/// Builder for constructing a MetricsReporter
#[derive(Default)]
pub struct MetricsReporterBuilder {
    registry: Option<Arc<MetricsRegistry>>,
    sink: Option<Arc<dyn MetricsSink>>,
    interval: Option<Duration>,
}

impl MetricsReporterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registry to sample
    pub fn registry(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the export sink
    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the reporting interval (default 60s)
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<MetricsReporter, MetricsError> {
        Ok(MetricsReporter {
            registry: self.registry.ok_or(MetricsError::Incomplete("registry"))?,
            sink: self.sink.ok_or(MetricsError::Incomplete("sink"))?,
            interval: self
                .interval
                .filter(|d| !d.is_zero())
                .unwrap_or(Duration::from_secs(60)),
            previous: None,
        })
    }
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    registry: Arc<MetricsRegistry>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    previous: Option<MetricsSnapshot>,
}

impl MetricsReporter {
    pub fn builder() -> MetricsReporterBuilder {
        MetricsReporterBuilder::new()
    }

    /// Run the reporter until cancellation
    ///
    /// A final report is emitted on shutdown.
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.sink.is_enabled() {
            info!(sink = self.sink.name(), "metrics reporting disabled");
            return;
        }

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            sink = self.sink.name(),
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.report();
                    info!("metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }

    /// Collect and export once
    pub fn report(&mut self) {
        let snapshot = self.registry.snapshot();
        self.sink.export(&snapshot, self.previous.as_ref());
        self.previous = Some(snapshot);
    }
}
