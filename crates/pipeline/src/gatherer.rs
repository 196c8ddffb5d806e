//! Gatherer - queue front end of a pipe
//!
//! Push mode: a [`NativeReceiver`](crate::NativeReceiver) registered on a
//! shared server enqueues whatever agents send, dropping on `Full`.
//!
//! Pull mode: a [`Fetcher`] is polled every `fetch_interval`; its events are
//! enqueued with retry, since a fetcher can always wait.
//!
//! In both modes one task per partition dequeues into that partition's
//! output channel, backing off while the partition is empty. On shutdown a
//! volatile partition is drained into the channel before the task exits;
//! durable partitions keep their events for the next start.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use satellite_protocol::{Event, Offset, SequenceEvent};
use satellite_queue::{Partition, Queue, QueueError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::PipelineMetrics;
use crate::offload;
use crate::{Fetcher, NativeReceiver, PipelineError, Result};

/// Pause after an empty dequeue or a full enqueue
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Where a gatherer's events come from
pub enum GathererSource {
    Receiver(Arc<NativeReceiver>),
    Fetcher {
        fetcher: Arc<dyn Fetcher>,
        interval: Duration,
    },
}

/// Gatherer stage of one pipe
pub struct Gatherer {
    pipe: String,
    queue: Arc<Queue>,
    source: GathererSource,
    backoff: Duration,
    senders: Mutex<Vec<Option<mpsc::Sender<SequenceEvent>>>>,
    outputs: Mutex<Option<Vec<mpsc::Receiver<SequenceEvent>>>>,
    metrics: PipelineMetrics,
}

impl Gatherer {
    /// Build a gatherer whose partitions each feed a channel of `output_buffer`
    pub fn new(
        pipe: impl Into<String>,
        queue: Arc<Queue>,
        source: GathererSource,
        output_buffer: usize,
    ) -> Self {
        let (senders, outputs): (Vec<_>, Vec<_>) = (0..queue.partition_count())
            .map(|_| {
                let (tx, rx) = mpsc::channel(output_buffer.max(1));
                (Some(tx), rx)
            })
            .unzip();
        Self {
            pipe: pipe.into(),
            queue,
            source,
            backoff: DEFAULT_BACKOFF,
            senders: Mutex::new(senders),
            outputs: Mutex::new(Some(outputs)),
            metrics: PipelineMetrics::detached(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn pipe(&self) -> &str {
        &self.pipe
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn partition_count(&self) -> usize {
        self.queue.partition_count()
    }

    /// Read sides of every partition's output channel, once
    pub fn take_outputs(&self) -> Option<Vec<mpsc::Receiver<SequenceEvent>>> {
        self.outputs.lock().take()
    }

    /// Acknowledge delivery up to `offset`
    pub fn ack(&self, offset: &Offset) -> Result<()> {
        Ok(self.queue.ack(offset)?)
    }

    /// Spawn the dequeue tasks, plus the fetch task in pull mode
    pub fn start(self: &Arc<Self>, tasks: &mut JoinSet<Result<()>>, cancel: CancellationToken) -> Result<()> {
        let senders: Vec<_> = self.senders.lock().iter_mut().map(Option::take).collect();
        if senders.iter().any(Option::is_none) {
            return Err(PipelineError::Unavailable("gatherer output"));
        }
        for (partition, output) in self.queue.partitions().iter().zip(senders.into_iter().flatten()) {
            let gatherer = Arc::clone(self);
            let partition = Arc::clone(partition);
            let cancel = cancel.clone();
            tasks.spawn(async move { gatherer.dequeue_loop(partition, output, cancel).await });
        }

        match &self.source {
            GathererSource::Receiver(receiver) => {
                info!(pipe = %self.pipe, receiver = receiver.name(), event_types = ?receiver.event_types(), "gatherer started");
            }
            GathererSource::Fetcher { fetcher, interval } => {
                info!(pipe = %self.pipe, fetcher = fetcher.name(), interval_ms = interval.as_millis() as u64, "gatherer started");
                let gatherer = Arc::clone(self);
                let fetcher = Arc::clone(fetcher);
                let period = *interval;
                tasks.spawn(async move { gatherer.fetch_loop(fetcher, period, cancel).await });
            }
        }
        Ok(())
    }

    async fn dequeue_loop(
        self: Arc<Self>,
        partition: Arc<dyn Partition>,
        output: mpsc::Sender<SequenceEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let index = partition.index();
        let mut pending = None;
        let mut open = true;
        while open && !cancel.is_cancelled() {
            match offload::dequeue(&partition).await {
                Ok(seq) => {
                    self.metrics.dequeued.inc();
                    // Reserve first so a cancel never loses the popped event
                    tokio::select! {
                        _ = cancel.cancelled() => pending = Some(seq),
                        permit = output.reserve() => match permit {
                            Ok(permit) => permit.send(seq),
                            Err(_) => {
                                debug!(pipe = %self.pipe, partition = index, "processor input closed");
                                open = false;
                            }
                        },
                    }
                }
                Err(QueueError::Empty) => self.pause(&cancel).await,
                Err(QueueError::Closed) => open = false,
                Err(e) if e.is_fatal() => {
                    error!(pipe = %self.pipe, partition = index, error = %e, "dequeue failed");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(pipe = %self.pipe, partition = index, error = %e, "dequeue error");
                    self.pause(&cancel).await;
                }
            }
        }

        // Durable partitions replay unacked events on restart
        if open && !partition.is_durable() {
            self.drain(&partition, &output, pending).await;
        }
        debug!(pipe = %self.pipe, partition = index, "dequeue loop stopped");
        Ok(())
    }

    /// Hand every event left in a volatile partition to the processor
    async fn drain(
        &self,
        partition: &Arc<dyn Partition>,
        output: &mpsc::Sender<SequenceEvent>,
        mut pending: Option<SequenceEvent>,
    ) {
        let index = partition.index();
        let mut drained = 0usize;
        loop {
            let seq = match pending.take() {
                Some(seq) => seq,
                None => match offload::dequeue(partition).await {
                    Ok(seq) => {
                        self.metrics.dequeued.inc();
                        seq
                    }
                    Err(QueueError::Empty | QueueError::Closed) => break,
                    Err(e) => {
                        warn!(pipe = %self.pipe, partition = index, error = %e, "drain stopped");
                        break;
                    }
                },
            };
            if output.send(seq).await.is_err() {
                warn!(pipe = %self.pipe, partition = index, "processor input closed during drain");
                break;
            }
            drained += 1;
        }
        if drained > 0 {
            info!(pipe = %self.pipe, partition = index, drained, "drained volatile partition on shutdown");
        }
    }

    async fn fetch_loop(
        self: Arc<Self>,
        fetcher: Arc<dyn Fetcher>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            let events = match fetcher.fetch().await {
                Ok(events) => events,
                Err(e) => {
                    warn!(pipe = %self.pipe, fetcher = fetcher.name(), error = %e, "fetch failed");
                    continue;
                }
            };
            for event in events {
                self.metrics.received.inc();
                if !self.enqueue_with_retry(event, &cancel).await? {
                    return Ok(());
                }
            }
        }
    }

    /// Returns `false` if cancelled while the queue stayed full
    async fn enqueue_with_retry(&self, event: Event, cancel: &CancellationToken) -> Result<bool> {
        loop {
            match offload::enqueue(&self.queue, event.clone()).await {
                Ok(_) => {
                    self.metrics.enqueued.inc();
                    return Ok(true);
                }
                Err(QueueError::Full) => {
                    self.pause(cancel).await;
                    if cancel.is_cancelled() {
                        return Ok(false);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    self.metrics.dropped.inc();
                    warn!(pipe = %self.pipe, event = %event.name, error = %e, "fetched event skipped");
                    return Ok(true);
                }
            }
        }
    }

    async fn pause(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = sleep(self.backoff) => {}
        }
    }

    /// Flush and close the queue
    pub fn close(&self) -> Result<()> {
        if let Err(e) = self.queue.flush() {
            warn!(pipe = %self.pipe, error = %e, "queue flush on close failed");
        }
        Ok(self.queue.close()?)
    }
}
