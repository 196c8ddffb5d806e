//! Pull-mode event sources

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use satellite_metrics::MetricsRegistry;
use satellite_protocol::{Event, EventType};
use serde::{Deserialize, Serialize};

use crate::{PipelineError, Result};

/// Produces a finite batch of events each time it is polled
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<Event>>;
}

/// ```yaml
/// plugin_name: self-meter
/// include: [pipe_, queue_]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SelfMeterConfig {
    /// Metric name prefixes to emit; empty emits everything
    pub include: Vec<String>,
}

/// Emits the process's own counters and gauges as meter events
///
/// One event per sample, named after the metric, with the sample's labels
/// as metadata and its JSON form as payload.
pub struct SelfMeterFetcher {
    config: SelfMeterConfig,
    registry: Arc<MetricsRegistry>,
}

impl SelfMeterFetcher {
    pub fn new(config: SelfMeterConfig, registry: Arc<MetricsRegistry>) -> Self {
        Self { config, registry }
    }

    fn included(&self, name: &str) -> bool {
        self.config.include.is_empty() || self.config.include.iter().any(|p| name.starts_with(p.as_str()))
    }
}

#[async_trait]
impl Fetcher for SelfMeterFetcher {
    fn name(&self) -> &'static str {
        "self-meter"
    }

    async fn fetch(&self) -> Result<Vec<Event>> {
        let snapshot = self.registry.snapshot();
        let timestamp = Utc::now().timestamp_millis();

        snapshot
            .samples
            .iter()
            .filter(|s| self.included(&s.name))
            .map(|sample| {
                let payload = serde_json::to_vec(sample)
                    .map_err(|e| PipelineError::fetch(self.name(), e.to_string()))?;
                let mut event = Event::new(sample.name.clone(), EventType::Meter, payload)
                    .with_timestamp(timestamp);
                event.meta = sample.labels.clone();
                Ok(event)
            })
            .collect()
    }
}
