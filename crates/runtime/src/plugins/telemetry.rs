//! Self-telemetry sinks
//!
//! Configured from the top-level `telemetry` section: `export_type` picks
//! the plugin and the remaining keys form its config.

use std::sync::Arc;

use satellite_config::{MetricsFormat, PluginConfig};
use satellite_metrics::{LogSink, MetricsSink, NoneSink};
use serde::Deserialize;

use super::typed;
use crate::error::Result;
use crate::registry::{BuildContext, Category, PluginFactory};

pub struct NoneSinkFactory;

impl PluginFactory<Arc<dyn MetricsSink>> for NoneSinkFactory {
    fn name(&self) -> &'static str {
        "none"
    }

    fn description(&self) -> &'static str {
        "Counters are kept but never exported."
    }

    fn create(&self, _config: &PluginConfig, _ctx: &BuildContext<'_>) -> Result<Arc<dyn MetricsSink>> {
        Ok(Arc::new(NoneSink))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogSinkConfig {
    format: MetricsFormat,
}

pub struct LogSinkFactory;

impl PluginFactory<Arc<dyn MetricsSink>> for LogSinkFactory {
    fn name(&self) -> &'static str {
        "log"
    }

    fn description(&self) -> &'static str {
        "Writes a snapshot of every counter and gauge to the log each interval, with \
         rates computed against the previous snapshot."
    }

    fn default_config(&self) -> &'static str {
        r#"
# human | json
format: human
"#
    }

    fn create(&self, config: &PluginConfig, _ctx: &BuildContext<'_>) -> Result<Arc<dyn MetricsSink>> {
        let cfg: LogSinkConfig = typed(Category::TelemetrySink, self.name(), config)?;
        Ok(Arc::new(LogSink::new(cfg.format)))
    }
}
