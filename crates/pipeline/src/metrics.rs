//! Per-pipe counters

use std::sync::Arc;

use satellite_metrics::{Counter, MetricsRegistry};

/// Counters shared by the stages of one pipe
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    /// Events handed to the gatherer
    pub received: Arc<Counter>,
    /// Events that made it into the queue
    pub enqueued: Arc<Counter>,
    /// Events abandoned because every partition was full
    pub dropped: Arc<Counter>,
    /// Events read back out of the queue
    pub dequeued: Arc<Counter>,
    /// Filter invocations that returned an error
    pub filter_errors: Arc<Counter>,
    /// Batches acknowledged on the queue
    pub acked_batches: Arc<Counter>,
}

impl PipelineMetrics {
    pub fn registered(registry: &MetricsRegistry, pipe: &str) -> Self {
        let labels = [("pipe", pipe)];
        Self {
            received: registry.counter("pipe_received_events", &labels),
            enqueued: registry.counter("pipe_enqueued_events", &labels),
            dropped: registry.counter("pipe_dropped_events", &labels),
            dequeued: registry.counter("pipe_dequeued_events", &labels),
            filter_errors: registry.counter("pipe_filter_errors", &labels),
            acked_batches: registry.counter("pipe_acked_batches", &labels),
        }
    }

    /// Counters nobody reports
    pub fn detached() -> Self {
        Self::default()
    }
}

/// Counters for one forwarder of one pipe
#[derive(Debug, Clone, Default)]
pub struct ForwarderMetrics {
    pub forwarded: Arc<Counter>,
    pub failed: Arc<Counter>,
    pub retried: Arc<Counter>,
}

impl ForwarderMetrics {
    pub fn registered(registry: &MetricsRegistry, pipe: &str, forward_type: &str) -> Self {
        let labels = [("pipe", pipe), ("forward_type", forward_type)];
        Self {
            forwarded: registry.counter("forwarder_batches_forwarded", &labels),
            failed: registry.counter("forwarder_batches_failed", &labels),
            retried: registry.counter("forwarder_batches_retried", &labels),
        }
    }
}
