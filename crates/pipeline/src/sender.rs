//! Sender - batching, status gating, dispatch and acknowledgement
//!
//! One buffering task per partition owns an open [`Batch`]. A batch is
//! flushed when it reaches `max_buffer_size`, or on the `flush_time` tick
//! once it holds at least `min_flush_events` contexts. Flushed batches go
//! through a per-partition flush channel to a consumer task that groups the
//! remote events by type, forwards each group, falls back on failure and
//! finally acks the batch's last offset.
//!
//! While the shared client reports `Disconnect` the buffering task stops
//! reading its input channel. The channel fills up and processors block on
//! send, so nothing is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use satellite_client::ClientStatus;
use satellite_forwarder::{Fallbacker, Forwarder, NoneFallbacker};
use satellite_metrics::MetricsRegistry;
use satellite_protocol::{Batch, Event, EventType, Offset, OutputContext};
use satellite_queue::Queue;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{ForwarderMetrics, PipelineMetrics};
use crate::rate_limited::RateLimitedLogger;
use crate::{PipelineError, Result, SyncInvoker};

/// Flushed batches waiting for the consumer, per partition
const FLUSH_CHANNEL_SIZE: usize = 1;

/// Acknowledges delivered offsets back to the queue
pub trait Acknowledger: Send + Sync {
    fn ack(&self, offset: &Offset) -> satellite_queue::Result<()>;
}

impl Acknowledger for Queue {
    fn ack(&self, offset: &Offset) -> satellite_queue::Result<()> {
        Queue::ack(self, offset)
    }
}

/// Buffering and flush policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderSettings {
    pub max_buffer_size: usize,
    pub min_flush_events: usize,
    pub flush_time: Duration,
    pub input_buffer: usize,
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            max_buffer_size: 200,
            min_flush_events: 1,
            flush_time: Duration::from_secs(1),
            input_buffer: 1000,
        }
    }
}

struct Route {
    forwarder: Arc<dyn Forwarder>,
    metrics: ForwarderMetrics,
}

/// Sender stage of one pipe
pub struct Sender {
    pipe: String,
    settings: SenderSettings,
    routes: Vec<Route>,
    fallbacker: Arc<dyn Fallbacker>,
    acker: Arc<dyn Acknowledger>,
    status: watch::Receiver<ClientStatus>,
    inputs: Vec<mpsc::Sender<OutputContext>>,
    receivers: Mutex<Vec<Option<mpsc::Receiver<OutputContext>>>>,
    metrics: PipelineMetrics,
    failures: RateLimitedLogger,
}

impl Sender {
    /// Build a sender with one input channel per queue partition
    pub fn new(
        pipe: impl Into<String>,
        partitions: usize,
        settings: SenderSettings,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        let capacity = settings.input_buffer.max(1);
        let (inputs, receivers): (Vec<_>, Vec<_>) = (0..partitions.max(1))
            .map(|_| {
                let (tx, rx) = mpsc::channel(capacity);
                (tx, Some(rx))
            })
            .unzip();
        // without a client the sender is always connected
        let (_, status) = watch::channel(ClientStatus::Connected);
        Self {
            pipe: pipe.into(),
            settings,
            routes: Vec::new(),
            fallbacker: Arc::new(NoneFallbacker),
            acker,
            status,
            inputs,
            receivers: Mutex::new(receivers),
            metrics: PipelineMetrics::detached(),
            failures: RateLimitedLogger::default(),
        }
    }

    /// Follow a shared client's status channel
    #[must_use]
    pub fn with_status(mut self, status: watch::Receiver<ClientStatus>) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_fallbacker(mut self, fallbacker: Arc<dyn Fallbacker>) -> Self {
        self.fallbacker = fallbacker;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Add a forwarder; counters are registered when a registry is given
    #[must_use]
    pub fn with_forwarder(
        mut self,
        forwarder: Arc<dyn Forwarder>,
        registry: Option<&MetricsRegistry>,
    ) -> Self {
        let metrics = registry
            .map(|r| ForwarderMetrics::registered(r, &self.pipe, forwarder.forward_type().as_str()))
            .unwrap_or_default();
        self.routes.push(Route { forwarder, metrics });
        self
    }

    pub fn pipe(&self) -> &str {
        &self.pipe
    }

    pub fn partition_count(&self) -> usize {
        self.inputs.len()
    }

    /// Write side of a partition's input channel
    pub fn input_channel(&self, partition: usize) -> Option<mpsc::Sender<OutputContext>> {
        self.inputs.get(partition).cloned()
    }

    /// Event types some forwarder handles
    pub fn forward_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = self.routes.iter().map(|r| r.forwarder.forward_type()).collect();
        types.sort();
        types.dedup();
        types
    }

    /// Spawn one buffering task per partition
    ///
    /// Each task drains its input, open batch and flush channel after `cancel`
    /// fires or its input closes. Fails if the sender was already started.
    pub fn start(self: &Arc<Self>, tasks: &mut JoinSet<Result<()>>, cancel: CancellationToken) -> Result<()> {
        let receivers: Vec<_> = self.receivers.lock().iter_mut().map(Option::take).collect();
        if receivers.iter().any(Option::is_none) {
            return Err(PipelineError::Unavailable("sender input"));
        }
        for (partition, input) in receivers.into_iter().flatten().enumerate() {
            let sender = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                sender.run_partition(partition, input, cancel).await;
                Ok(())
            });
        }
        info!(pipe = %self.pipe, partitions = self.inputs.len(), forward_types = ?self.forward_types(), "sender started");
        Ok(())
    }

    async fn run_partition(
        self: Arc<Self>,
        partition: usize,
        mut input: mpsc::Receiver<OutputContext>,
        cancel: CancellationToken,
    ) {
        let (flush_tx, flush_rx) = mpsc::channel::<Batch>(FLUSH_CHANNEL_SIZE);
        let consumer = tokio::spawn(Arc::clone(&self).consume_loop(partition, flush_rx));

        let mut status = self.status.clone();
        let mut status_open = true;
        let mut connected = *status.borrow_and_update() == ClientStatus::Connected;
        let mut batch = self.fresh_batch();
        let mut ticker = interval(self.settings.flush_time);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = status.changed(), if status_open => match changed {
                    Ok(()) => {
                        connected = *status.borrow_and_update() == ClientStatus::Connected;
                        debug!(pipe = %self.pipe, partition, connected, "sender gate changed");
                    }
                    Err(_) => status_open = false,
                },
                received = input.recv(), if connected => match received {
                    Some(ctx) => self.buffer(&flush_tx, &mut batch, ctx).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() && batch.len() >= self.settings.min_flush_events {
                        self.flush(&flush_tx, &mut batch).await;
                    }
                }
            }
        }

        // Contexts already handed over by the processors are delivered too
        input.close();
        let mut drained = 0usize;
        while let Some(ctx) = input.recv().await {
            self.buffer(&flush_tx, &mut batch, ctx).await;
            drained += 1;
        }
        if drained > 0 {
            debug!(pipe = %self.pipe, partition, drained, "drained sender input on shutdown");
        }
        if !batch.is_empty() {
            self.flush(&flush_tx, &mut batch).await;
        }
        drop(flush_tx);
        if let Err(e) = consumer.await {
            warn!(pipe = %self.pipe, partition, error = %e, "sender consumer failed");
        }
        debug!(pipe = %self.pipe, partition, "sender partition stopped");
    }

    async fn buffer(&self, flush_tx: &mpsc::Sender<Batch>, batch: &mut Batch, ctx: OutputContext) {
        if let Err(ctx) = batch.push(ctx) {
            self.flush(flush_tx, batch).await;
            let _ = batch.push(ctx);
        }
        if batch.is_full() {
            self.flush(flush_tx, batch).await;
        }
    }

    fn fresh_batch(&self) -> Batch {
        Batch::new(self.settings.max_buffer_size)
    }

    async fn flush(&self, flush_tx: &mpsc::Sender<Batch>, batch: &mut Batch) {
        let full = std::mem::replace(batch, self.fresh_batch());
        if flush_tx.send(full).await.is_err() {
            warn!(pipe = %self.pipe, "flush channel closed, batch not delivered");
        }
    }

    async fn consume_loop(self: Arc<Self>, partition: usize, mut flush_rx: mpsc::Receiver<Batch>) {
        while let Some(batch) = flush_rx.recv().await {
            self.consume(partition, batch).await;
        }
    }

    /// Forward every type group of `batch`, then ack its last offset
    pub async fn consume(&self, partition: usize, batch: Batch) {
        for (event_type, events) in batch.group_remote_by_type() {
            let mut matched = false;
            for route in self.routes.iter().filter(|r| r.forwarder.forward_type() == event_type) {
                matched = true;
                self.forward(route, &events).await;
            }
            if !matched {
                debug!(pipe = %self.pipe, partition, event_type = %event_type, events = events.len(), "no forwarder for event type");
            }
        }

        let Some(offset) = batch.last_offset() else {
            return;
        };
        match self.acker.ack(&offset) {
            Ok(()) => self.metrics.acked_batches.inc(),
            Err(e) => warn!(pipe = %self.pipe, partition, offset = %offset, error = %e, "ack failed"),
        }
    }

    async fn forward(&self, route: &Route, events: &[Event]) {
        let forwarder = route.forwarder.as_ref();
        let Err(first) = forwarder.forward(events).await else {
            route.metrics.forwarded.inc();
            return;
        };
        route.metrics.retried.inc();
        match self.fallbacker.fallback(forwarder, events, first).await {
            Ok(()) => route.metrics.forwarded.inc(),
            Err(e) => {
                route.metrics.failed.inc();
                self.failures.warn(&self.pipe, "batch abandoned after fallback", &e);
            }
        }
    }
}

#[async_trait]
impl SyncInvoker for Sender {
    async fn sync_invoke(&self, event: Event) -> Result<Event> {
        let route = self
            .routes
            .iter()
            .find(|r| r.forwarder.forward_type() == event.event_type && r.forwarder.supports_sync())
            .ok_or(PipelineError::NoSyncForwarder(event.event_type))?;
        Ok(route.forwarder.sync_forward(&event).await?)
    }
}
