//! Pipe assembly
//!
//! Modules are built in dependency order: the queue first (its partition
//! count sizes everything downstream), then the sender, the processor that
//! feeds it, and finally the gatherer whose receiver answers sync calls
//! through the processor.

use std::sync::Arc;

use satellite_config::{
    ConfigError, GathererConfig, PipeConfig, PluginConfig, ProcessorConfig, SenderConfig,
};
use satellite_filter::Chain;
use satellite_metrics::MetricsRegistry;
use satellite_pipeline::{
    Acknowledger, Gatherer, GathererSource, Pipe, PipelineMetrics, Processor, Sender,
    SenderSettings, SyncInvoker,
};
use satellite_queue::Queue;
use tracing::info;

use crate::error::Result;
use crate::registry::{BuildContext, PluginRegistry};
use crate::sharing::SharingManager;

/// Queue used when a gatherer names none
pub const DEFAULT_QUEUE: &str = "memory-queue";

/// Fallbacker used when a sender names none
pub const DEFAULT_FALLBACKER: &str = "none-fallbacker";

pub struct PipeBuilder<'a> {
    registry: &'a PluginRegistry,
    sharing: &'a SharingManager,
    metrics: &'a Arc<MetricsRegistry>,
}

impl<'a> PipeBuilder<'a> {
    pub fn new(
        registry: &'a PluginRegistry,
        sharing: &'a SharingManager,
        metrics: &'a Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            sharing,
            metrics,
        }
    }

    /// Build every module of one pipe and wire them together
    pub fn build(&self, config: &PipeConfig) -> Result<Pipe> {
        let name = config.name();
        let gatherer_cfg = config
            .gatherer
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("pipe", name, "gatherer"))?;
        let sender_cfg = config
            .sender
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("pipe", name, "sender"))?;
        let processor_cfg = config.processor.clone().unwrap_or_default();

        let pipe_metrics = PipelineMetrics::registered(self.metrics, name);
        let queue = self.build_queue(name, gatherer_cfg)?;
        let sender = Arc::new(self.build_sender(name, sender_cfg, &queue, &pipe_metrics)?);
        let processor = Arc::new(
            self.build_processor(name, &processor_cfg, Arc::clone(&sender))?
                .with_metrics(pipe_metrics.clone()),
        );
        let source = self.build_source(
            name,
            gatherer_cfg,
            &queue,
            Arc::clone(&processor) as Arc<dyn SyncInvoker>,
        )?;
        let gatherer = Gatherer::new(name, queue, source, gatherer_cfg.output_buffer)
            .with_metrics(pipe_metrics);

        info!(
            pipe = name,
            partitions = gatherer.partition_count(),
            filters = ?processor.filters(),
            forward_types = ?sender.forward_types(),
            "pipe assembled"
        );
        Ok(Pipe::new(Arc::new(gatherer), processor, sender))
    }

    fn build_queue(&self, pipe: &str, config: &GathererConfig) -> Result<Arc<Queue>> {
        let ctx = BuildContext::new(pipe, self.metrics);
        match &config.queue {
            Some(queue) => self.registry.queues.create(queue, &ctx),
            None => self
                .registry
                .queues
                .create(&PluginConfig::named(DEFAULT_QUEUE), &ctx),
        }
    }

    fn build_sender(
        &self,
        pipe: &str,
        config: &SenderConfig,
        queue: &Arc<Queue>,
        metrics: &PipelineMetrics,
    ) -> Result<Sender> {
        let client = match config.client_name.as_deref() {
            Some(client) => Some(
                self.sharing
                    .client(client)
                    .ok_or_else(|| ConfigError::unknown_reference(pipe, "client", client))?,
            ),
            None => None,
        };
        let ctx = BuildContext::new(pipe, self.metrics).with_client(client);

        let settings = SenderSettings {
            max_buffer_size: config.max_buffer_size,
            min_flush_events: config.min_flush_events,
            flush_time: config.flush_time,
            input_buffer: config.input_buffer,
        };
        let fallbacker = match &config.fallbacker {
            Some(fallbacker) => self.registry.fallbackers.create(fallbacker, &ctx)?,
            None => self
                .registry
                .fallbackers
                .create(&PluginConfig::named(DEFAULT_FALLBACKER), &ctx)?,
        };

        let acker = Arc::clone(queue) as Arc<dyn Acknowledger>;
        let mut sender = Sender::new(pipe, queue.partition_count(), settings, acker)
            .with_fallbacker(fallbacker)
            .with_metrics(metrics.clone());
        if let Some(client) = client {
            sender = sender.with_status(client.subscribe());
        }
        for forwarder in &config.forwarders {
            let forwarder = self.registry.forwarders.create(forwarder, &ctx)?;
            sender = sender.with_forwarder(forwarder, Some(self.metrics.as_ref()));
        }
        Ok(sender)
    }

    fn build_processor(
        &self,
        pipe: &str,
        config: &ProcessorConfig,
        sender: Arc<Sender>,
    ) -> Result<Processor> {
        let ctx = BuildContext::new(pipe, self.metrics);
        let filters = config
            .filters
            .iter()
            .map(|filter| self.registry.filters.create(filter, &ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Processor::new(pipe, Chain::new(filters), sender))
    }

    fn build_source(
        &self,
        pipe: &str,
        config: &GathererConfig,
        queue: &Arc<Queue>,
        sync: Arc<dyn SyncInvoker>,
    ) -> Result<GathererSource> {
        match (&config.receiver, &config.fetcher) {
            (Some(receiver), None) => {
                let server_name = config
                    .server_name
                    .as_deref()
                    .ok_or_else(|| ConfigError::missing_field("pipe", pipe, "server_name"))?;
                let server = self
                    .sharing
                    .server(server_name)
                    .ok_or_else(|| ConfigError::unknown_reference(pipe, "server", server_name))?;
                let ctx = BuildContext::new(pipe, self.metrics)
                    .with_queue(queue)
                    .with_sync(sync);
                let receiver = self.registry.receivers.create(receiver, &ctx)?;
                receiver.register(server)?;
                Ok(GathererSource::Receiver(receiver))
            }
            (None, Some(fetcher)) => {
                let ctx = BuildContext::new(pipe, self.metrics).with_queue(queue);
                let fetcher = self.registry.fetchers.create(fetcher, &ctx)?;
                Ok(GathererSource::Fetcher {
                    fetcher,
                    interval: config.fetch_interval,
                })
            }
            _ => Err(ConfigError::invalid_value(
                "pipe",
                pipe,
                "gatherer",
                "exactly one of receiver or fetcher is required",
            )
            .into()),
        }
    }
}
