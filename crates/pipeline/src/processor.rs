//! Processor - filter chain between queue and sender

use std::sync::Arc;

use async_trait::async_trait;
use satellite_filter::Chain;
use satellite_protocol::{Event, OutputContext, SequenceEvent};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::PipelineMetrics;
use crate::rate_limited::RateLimitedLogger;
use crate::{Result, Sender, SyncInvoker};

/// Processor stage of one pipe
pub struct Processor {
    pipe: String,
    chain: Chain,
    sender: Arc<Sender>,
    metrics: PipelineMetrics,
    filter_failures: RateLimitedLogger,
}

impl Processor {
    pub fn new(pipe: impl Into<String>, chain: Chain, sender: Arc<Sender>) -> Self {
        Self {
            pipe: pipe.into(),
            chain,
            sender,
            metrics: PipelineMetrics::detached(),
            filter_failures: RateLimitedLogger::default(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn filters(&self) -> Vec<&'static str> {
        self.chain.names()
    }

    /// Seed a context from `seq` and run every filter over it
    pub fn process(&self, seq: SequenceEvent) -> OutputContext {
        let mut ctx = OutputContext::new(seq);
        for e in self.chain.process(&mut ctx) {
            self.metrics.filter_errors.inc();
            self.filter_failures.warn(&self.pipe, "filter failed", &e);
        }
        ctx
    }

    /// Spawn one task per partition moving events from `inputs` into the
    /// sender's matching input channel
    ///
    /// With `drain` set, a task keeps going after `cancel` until its input
    /// closes, so nothing a volatile queue handed over is dropped.
    pub fn start(
        self: &Arc<Self>,
        inputs: Vec<mpsc::Receiver<SequenceEvent>>,
        tasks: &mut JoinSet<Result<()>>,
        cancel: CancellationToken,
        drain: bool,
    ) {
        info!(pipe = %self.pipe, partitions = inputs.len(), filters = ?self.filters(), drain, "processor started");
        for (partition, input) in inputs.into_iter().enumerate() {
            let Some(output) = self.sender.input_channel(partition) else {
                debug!(pipe = %self.pipe, partition, "no sender input for partition");
                continue;
            };
            let processor = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                processor.run_partition(partition, input, output, cancel, drain).await;
                Ok(())
            });
        }
    }

    async fn run_partition(
        &self,
        partition: usize,
        mut input: mpsc::Receiver<SequenceEvent>,
        output: mpsc::Sender<OutputContext>,
        cancel: CancellationToken,
        drain: bool,
    ) {
        let mut draining = false;
        loop {
            let received = if draining {
                input.recv().await
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if !drain {
                            break;
                        }
                        draining = true;
                        continue;
                    }
                    received = input.recv() => received,
                }
            };
            let Some(seq) = received else { break };
            let ctx = self.process(seq);

            // blocks while the sender is gated on a disconnected client
            let permit = if draining {
                output.reserve().await
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if !drain {
                            break;
                        }
                        draining = true;
                        output.reserve().await
                    }
                    permit = output.reserve() => permit,
                }
            };
            match permit {
                Ok(permit) => permit.send(ctx),
                Err(_) => {
                    debug!(pipe = %self.pipe, partition, "sender input closed");
                    break;
                }
            }
        }
        debug!(pipe = %self.pipe, partition, draining, "processor partition stopped");
    }
}

#[async_trait]
impl SyncInvoker for Processor {
    async fn sync_invoke(&self, event: Event) -> Result<Event> {
        self.sender.sync_invoke(event).await
    }
}
