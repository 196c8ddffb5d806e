//! Satellite - Metrics
//!
//! Self-telemetry for the sidecar.
//!
//! # Overview
//!
//! This crate provides:
//! - Atomic `Counter` and `Gauge` primitives
//! - A `MetricsRegistry` keyed by metric name plus labels
//! - The `MetricsSink` abstraction with `none` and `log` exporters
//! - A periodic `MetricsReporter` that snapshots the registry into a sink
//!
//! # Design Principles
//!
//! - **Lock-free updates**: components hold `Arc<Counter>` handles and never
//!   touch the registry lock on the hot path
//! - **Sink-agnostic**: the core only sees `dyn MetricsSink`
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(MetricsRegistry::new(&config.telemetry));
//! let dropped = registry.counter("queue_full_dropped", &[("pipe", "trace")]);
//! dropped.inc();
//!
//! let sink: Arc<dyn MetricsSink> = Arc::new(LogSink::new(MetricsFormat::Human));
//! let reporter = MetricsReporter::builder()
//!     .registry(Arc::clone(&registry))
//!     .sink(sink)
//!     .interval(config.telemetry.interval)
//!     .build()?;
//! tokio::spawn(reporter.run(cancel.child_token()));
//! ```

pub mod format;
mod registry;
mod reporter;
mod sink;

pub use format::{HumanFormatter, JsonFormatter, MetricsFormatter};
pub use registry::{MetricKind, MetricsRegistry, MetricsSnapshot, Sample};
pub use reporter::{MetricsReporter, MetricsReporterBuilder};
pub use sink::{LogSink, MetricsError, MetricsSink, NoneSink};

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Atomic counter wrapper for convenient metric operations
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Create a new counter initialized to 0
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increment the counter by `val`
    #[inline]
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Increment the counter by 1
    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    /// Get the current value
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Atomic gauge that can move both ways
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    #[inline]
    pub fn set(&self, val: i64) {
        self.0.store(val, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}
