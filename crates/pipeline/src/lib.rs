//! Satellite Pipeline - the stages of one pipe
//!
//! # Architecture
//!
//! ```text
//!   agents ──→ NativeReceiver ─┐
//!                              ├──→ Queue ──→ Gatherer ──→ Processor ──→ Sender ──→ Forwarders
//!   Fetcher (every interval) ──┘   (N partitions, one task each per stage)   │
//!                                      ↑                                      │
//!                                      └────────────── ack(last offset) ──────┘
//! ```
//!
//! # Key Design
//!
//! - **FIFO per partition**: every stage runs one task per partition
//! - **Back-pressure**: bounded `mpsc` channels between stages; the sender
//!   stops reading while the shared client is disconnected
//! - **At-least-once**: a batch is acked only after every forwarder had
//!   its attempt; unacked offsets are replayed by durable queues
//! - **Drop at ingress only**: receivers drop on `QueueFull`, fetchers wait
//!
//! # Example
//!
//! ```ignore
//! let queue = Arc::new(Queue::memory("trace", &MemoryQueueConfig::default(), None)?);
//! let sender = Arc::new(
//!     Sender::new("trace", queue.partition_count(), settings, queue.clone())
//!         .with_status(client.subscribe())
//!         .with_forwarder(forwarder, None),
//! );
//! let processor = Arc::new(Processor::new("trace", Chain::empty(), sender.clone()));
//! let receiver = Arc::new(NativeReceiver::new("trace", config, queue.clone()).with_sync(processor.clone()));
//! receiver.register(&server)?;
//! let gatherer = Arc::new(Gatherer::new("trace", queue, GathererSource::Receiver(receiver), 1000));
//! Pipe::new(gatherer, processor, sender).run(cancel).await?;
//! ```

mod error;
mod fetcher;
mod gatherer;
mod metrics;
mod offload;
mod pipe;
mod processor;
mod rate_limited;
mod receiver;
mod sender;

pub use error::{PipelineError, Result};
pub use fetcher::{Fetcher, SelfMeterConfig, SelfMeterFetcher};
pub use gatherer::{DEFAULT_BACKOFF, Gatherer, GathererSource};
pub use metrics::{ForwarderMetrics, PipelineMetrics};
pub use pipe::Pipe;
pub use processor::Processor;
pub use rate_limited::RateLimitedLogger;
pub use receiver::{NativeReceiver, NativeReceiverConfig};
pub use sender::{Acknowledger, Sender, SenderSettings};

use async_trait::async_trait;
use satellite_protocol::Event;

/// Request/response path that bypasses the queue
#[async_trait]
pub trait SyncInvoker: Send + Sync {
    async fn sync_invoke(&self, event: Event) -> Result<Event>;
}
