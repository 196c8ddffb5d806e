//! Satellite Queue - Partitioned buffering between gatherer and processor
//!
//! A [`Queue`] owns one or more [`Partition`]s. The gatherer enqueues through
//! the router, which picks partitions round-robin and probes the rest when
//! the chosen one is full. Each partition is read by exactly one processor
//! task and acked by the sender once a batch has been forwarded.
//!
//! # Partition kinds
//!
//! - [`MmapPartition`] - durable ring of memory-mapped segment files
//! - [`MemoryPartition`] - bounded in-memory FIFO, lost on crash
//! - [`NonePartition`] - stores nothing; for request/response pipes
//!
//! # Example
//!
//! ```ignore
//! let queue = Queue::memory("trace", &MemoryQueueConfig::default(), None)?;
//! queue.enqueue(&event)?;
//! let seq = queue.partition(0).unwrap().dequeue()?;
//! queue.ack(&seq.offset)?;
//! ```

mod error;
mod memory;
mod metrics;
pub mod mmap;
mod none;

pub use error::{QueueError, Result};
pub use memory::{MemoryPartition, MemoryQueueConfig};
pub use metrics::QueueMetrics;
pub use mmap::{MmapPartition, MmapQueueConfig};
pub use none::NonePartition;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use satellite_metrics::MetricsRegistry;
use satellite_protocol::{Event, Offset, SequenceEvent};
use tracing::{error, info};

/// One FIFO lane of a queue
///
/// Exactly one producer and one consumer per partition. `ack` may come from
/// a third task.
pub trait Partition: Send + Sync {
    /// Partition index within its queue
    fn index(&self) -> usize;

    /// Append one event; `Full` when there is no room
    fn enqueue(&self, event: &Event) -> Result<()>;

    /// Pop the next event; `Empty` when caught up
    fn dequeue(&self) -> Result<SequenceEvent>;

    /// Mark everything up to `offset` as delivered
    fn ack(&self, offset: &Offset) -> Result<()>;

    fn is_full(&self) -> bool;

    /// Whether unacked events survive a restart
    fn is_durable(&self) -> bool {
        false
    }

    /// Persist pending writes
    fn flush(&self) -> Result<()>;

    /// Flush and release resources; later calls fail with `Closed`
    fn close(&self) -> Result<()>;
}

/// Partition router for one pipe
pub struct Queue {
    pipe: String,
    partitions: Vec<Arc<dyn Partition>>,
    next: AtomicUsize,
}

impl Queue {
    /// Build a queue over existing partitions
    ///
    /// Partition `i` must report index `i`.
    pub fn new(pipe: impl Into<String>, partitions: Vec<Arc<dyn Partition>>) -> Result<Self> {
        if partitions.is_empty() {
            return Err(QueueError::InvalidConfig("queue needs at least one partition".into()));
        }
        if let Some((i, p)) = partitions.iter().enumerate().find(|(i, p)| p.index() != *i) {
            return Err(QueueError::InvalidConfig(format!(
                "partition at position {i} reports index {}",
                p.index()
            )));
        }
        Ok(Self {
            pipe: pipe.into(),
            partitions,
            next: AtomicUsize::new(0),
        })
    }

    /// Durable queue under `<queue_dir>/<pipe>/partition-<i>`
    pub fn mmap(
        pipe: &str,
        config: &MmapQueueConfig,
        registry: Option<&MetricsRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let mut partitions: Vec<Arc<dyn Partition>> = Vec::with_capacity(config.partition);
        for index in 0..config.partition {
            let dir = config.partition_dir(pipe, index);
            let metrics = partition_metrics(registry, pipe, index);
            partitions.push(Arc::new(MmapPartition::open(config, &dir, index, metrics)?));
        }
        info!(
            pipe,
            partitions = config.partition,
            dir = %config.queue_dir.display(),
            "opened mmap queue"
        );
        Self::new(pipe, partitions)
    }

    /// Volatile in-memory queue
    pub fn memory(
        pipe: &str,
        config: &MemoryQueueConfig,
        registry: Option<&MetricsRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let partitions = (0..config.partition)
            .map(|index| {
                let metrics = partition_metrics(registry, pipe, index);
                Arc::new(MemoryPartition::new(index, config.event_buffer_size, metrics))
                    as Arc<dyn Partition>
            })
            .collect();
        Self::new(pipe, partitions)
    }

    /// Single pass-through partition
    pub fn none(pipe: &str) -> Self {
        Self {
            pipe: pipe.to_string(),
            partitions: vec![Arc::new(NonePartition::new(0))],
            next: AtomicUsize::new(0),
        }
    }

    pub fn pipe(&self) -> &str {
        &self.pipe
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partitions(&self) -> &[Arc<dyn Partition>] {
        &self.partitions
    }

    pub fn partition(&self, index: usize) -> Option<&Arc<dyn Partition>> {
        self.partitions.get(index)
    }

    /// True when every partition keeps unacked events across restarts
    pub fn is_durable(&self) -> bool {
        self.partitions.iter().all(|p| p.is_durable())
    }

    /// Round-robin enqueue, probing the other partitions when the chosen
    /// one is full. Returns the partition the event landed in.
    pub fn enqueue(&self, event: &Event) -> Result<usize> {
        let n = self.partitions.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % n;
        for step in 0..n {
            let partition = &self.partitions[(start + step) % n];
            if partition.is_full() {
                continue;
            }
            match partition.enqueue(event) {
                Ok(()) => return Ok(partition.index()),
                Err(QueueError::Full) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(QueueError::Full)
    }

    /// Ack on the partition the offset belongs to
    pub fn ack(&self, offset: &Offset) -> Result<()> {
        let partition = self.partitions.get(offset.partition).ok_or_else(|| {
            QueueError::corrupted(offset, format!("no partition {}", offset.partition))
        })?;
        partition.ack(offset)
    }

    pub fn flush(&self) -> Result<()> {
        for partition in &self.partitions {
            partition.flush()?;
        }
        Ok(())
    }

    /// Close every partition, returning the first failure
    pub fn close(&self) -> Result<()> {
        let mut first_err = None;
        for partition in &self.partitions {
            if let Err(e) = partition.close() {
                error!(pipe = %self.pipe, partition = partition.index(), error = %e, "failed to close partition");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("pipe", &self.pipe)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

fn partition_metrics(registry: Option<&MetricsRegistry>, pipe: &str, index: usize) -> QueueMetrics {
    registry.map_or_else(QueueMetrics::detached, |r| QueueMetrics::registered(r, pipe, index))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
