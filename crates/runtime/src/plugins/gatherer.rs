//! Gatherer sources: receivers (push) and fetchers (pull)

use std::sync::Arc;

use satellite_config::PluginConfig;
use satellite_pipeline::{
    Fetcher, NativeReceiver, NativeReceiverConfig, PipelineMetrics, SelfMeterConfig,
    SelfMeterFetcher,
};

use super::typed;
use crate::error::{Result, RuntimeError};
use crate::registry::{BuildContext, Category, PluginFactory, invalid};

pub struct NativeReceiverFactory;

impl PluginFactory<Arc<NativeReceiver>> for NativeReceiverFactory {
    fn name(&self) -> &'static str {
        "native-receiver"
    }

    fn description(&self) -> &'static str {
        "Claims event types on the pipe's server and enqueues what arrives. When the \
         queue is full the events are dropped and counted. Request/response types \
         bypass the queue and are answered through the pipe's sync forwarder."
    }

    fn default_config(&self) -> &'static str {
        r#"
# Event types claimed on the server
event_types: [segment]
"#
    }

    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<Arc<NativeReceiver>> {
        let cfg: NativeReceiverConfig = typed(Category::Receiver, self.name(), config)?;
        if cfg.event_types.is_empty() {
            return Err(invalid(Category::Receiver, self.name(), "event_types must not be empty"));
        }
        let queue = ctx.require_queue(Category::Receiver, self.name())?;
        let mut receiver = NativeReceiver::new(ctx.pipe, cfg, Arc::clone(queue))
            .with_metrics(PipelineMetrics::registered(ctx.metrics, ctx.pipe));
        if let Some(sync) = &ctx.sync {
            receiver = receiver.with_sync(Arc::clone(sync));
        }
        Ok(Arc::new(receiver))
    }
}

pub struct SelfMeterFactory;

impl PluginFactory<Arc<dyn Fetcher>> for SelfMeterFactory {
    fn name(&self) -> &'static str {
        "self-meter"
    }

    fn description(&self) -> &'static str {
        "Emits Satellite's own counters and gauges as meter events on every fetch \
         interval, one event per sample with its labels as metadata."
    }

    fn default_config(&self) -> &'static str {
        r#"
# Metric name prefixes to emit; empty emits everything
include: []
"#
    }

    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<Arc<dyn Fetcher>> {
        let cfg: SelfMeterConfig = typed(Category::Fetcher, self.name(), config)?;
        if cfg.include.iter().any(String::is_empty) {
            return Err(RuntimeError::plugin(self.name(), "include prefixes must not be empty"));
        }
        Ok(Arc::new(SelfMeterFetcher::new(cfg, Arc::clone(ctx.metrics))))
    }
}
