//! Per-partition queue counters

use std::sync::Arc;

use satellite_metrics::{Counter, Gauge, MetricsRegistry};

/// Counters for one partition
///
/// Built from a registry so the reporter sees them, or detached for tests.
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    pub enqueued: Arc<Counter>,
    pub dequeued: Arc<Counter>,
    pub acked: Arc<Counter>,
    pub full: Arc<Counter>,
    pub too_large: Arc<Counter>,
    pub flushes: Arc<Counter>,
    pub swapped_out: Arc<Counter>,
    pub mapped: Arc<Gauge>,
}

impl QueueMetrics {
    /// Counters registered under `pipe` / `partition` labels
    pub fn registered(registry: &MetricsRegistry, pipe: &str, partition: usize) -> Self {
        let partition = partition.to_string();
        let labels = [("pipe", pipe), ("partition", partition.as_str())];
        Self {
            enqueued: registry.counter("queue_enqueued", &labels),
            dequeued: registry.counter("queue_dequeued", &labels),
            acked: registry.counter("queue_acked", &labels),
            full: registry.counter("queue_full", &labels),
            too_large: registry.counter("queue_event_too_large", &labels),
            flushes: registry.counter("queue_flushes", &labels),
            swapped_out: registry.counter("queue_segments_swapped_out", &labels),
            mapped: registry.gauge("queue_segments_mapped", &labels),
        }
    }

    /// Counters nobody reports
    pub fn detached() -> Self {
        Self {
            enqueued: Arc::default(),
            dequeued: Arc::default(),
            acked: Arc::default(),
            full: Arc::default(),
            too_large: Arc::default(),
            flushes: Arc::default(),
            swapped_out: Arc::default(),
            mapped: Arc::default(),
        }
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::detached()
    }
}
