//! Volatile in-memory partition
//!
//! Same contract as the mmap partition minus persistence: offsets carry no
//! position and ack is a no-op.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use satellite_protocol::{Event, Offset, SequenceEvent};
use serde::Deserialize;

use crate::error::{QueueError, Result};
use crate::metrics::QueueMetrics;
use crate::Partition;

/// Configuration for the `memory-queue` plugin
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryQueueConfig {
    /// Number of partitions
    /// Default: 1
    pub partition: usize,

    /// Events buffered per partition
    /// Default: 5000
    pub event_buffer_size: usize,
}

impl Default for MemoryQueueConfig {
    fn default() -> Self {
        Self {
            partition: 1,
            event_buffer_size: 5000,
        }
    }
}

impl MemoryQueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.partition == 0 {
            return Err(QueueError::InvalidConfig("partition must be at least 1".into()));
        }
        if self.event_buffer_size == 0 {
            return Err(QueueError::InvalidConfig(
                "event_buffer_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Bounded FIFO held in memory
pub struct MemoryPartition {
    index: usize,
    capacity: usize,
    events: Mutex<VecDeque<Event>>,
    closed: AtomicBool,
    metrics: QueueMetrics,
}

impl MemoryPartition {
    pub fn new(index: usize, capacity: usize, metrics: QueueMetrics) -> Self {
        Self {
            index,
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

impl Partition for MemoryPartition {
    fn index(&self) -> usize {
        self.index
    }

    fn enqueue(&self, event: &Event) -> Result<()> {
        self.ensure_open()?;
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            self.metrics.full.inc();
            return Err(QueueError::Full);
        }
        events.push_back(event.clone());
        self.metrics.enqueued.inc();
        Ok(())
    }

    fn dequeue(&self) -> Result<SequenceEvent> {
        self.ensure_open()?;
        let event = self.events.lock().pop_front().ok_or(QueueError::Empty)?;
        self.metrics.dequeued.inc();
        Ok(SequenceEvent::new(event, Offset::volatile(self.index)))
    }

    fn ack(&self, _offset: &Offset) -> Result<()> {
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.events.lock().len() >= self.capacity
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let dropped = {
            let mut events = self.events.lock();
            let n = events.len();
            events.clear();
            n
        };
        if dropped > 0 {
            tracing::warn!(partition = self.index, dropped, "memory queue closed with pending events");
        }
        Ok(())
    }
}
