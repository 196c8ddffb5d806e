//! Metric registry
//!
//! Components register counters and gauges once at construction and keep
//! the returned `Arc` handles. The registry only walks its maps when a
//! snapshot is taken.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use satellite_config::TelemetryConfig;
use serde::Serialize;

use crate::{Counter, Gauge};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        labels.sort();
        Self {
            name: name.to_string(),
            labels,
        }
    }
}

/// Kind of a sampled metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// One sampled value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub kind: MetricKind,
    pub value: i64,
}

impl Sample {
    /// Label value by key
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Point-in-time view of every registered metric
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub taken_at: Instant,
    pub samples: Vec<Sample>,
}

impl MetricsSnapshot {
    /// Per-second rate of each counter relative to an earlier snapshot
    ///
    /// Gauges and counters missing from `previous` are skipped.
    pub fn rates(&self, previous: &MetricsSnapshot) -> Vec<(&Sample, f64)> {
        let elapsed = self.taken_at.duration_since(previous.taken_at).as_secs_f64();
        if elapsed <= 0.0 {
            return Vec::new();
        }
        self.samples
            .iter()
            .filter(|s| s.kind == MetricKind::Counter)
            .filter_map(|s| {
                previous
                    .samples
                    .iter()
                    .find(|p| p.name == s.name && p.labels == s.labels)
                    .map(|p| (s, (s.value - p.value).max(0) as f64 / elapsed))
            })
            .collect()
    }

    /// Look up a sample by name and a subset of labels
    pub fn find(&self, name: &str, labels: &[(&str, &str)]) -> Option<&Sample> {
        self.samples
            .iter()
            .find(|s| s.name == name && labels.iter().all(|(k, v)| s.label(k) == Some(*v)))
    }
}

/// Registry of named, labelled metrics
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    common_labels: Vec<(String, String)>,
    counters: RwLock<BTreeMap<MetricKey, Arc<Counter>>>,
    gauges: RwLock<BTreeMap<MetricKey, Arc<Gauge>>>,
}

impl MetricsRegistry {
    /// Registry whose samples carry cluster/service/instance labels
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            common_labels: vec![
                ("cluster".into(), config.cluster.clone()),
                ("service".into(), config.service.clone()),
                ("instance".into(), config.instance.clone()),
            ],
            ..Self::default()
        }
    }

    /// Get or create a counter
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Arc<Counter> {
        let key = MetricKey::new(name, labels);
        if let Some(c) = self.counters.read().get(&key) {
            return Arc::clone(c);
        }
        Arc::clone(self.counters.write().entry(key).or_default())
    }

    /// Get or create a gauge
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Arc<Gauge> {
        let key = MetricKey::new(name, labels);
        if let Some(g) = self.gauges.read().get(&key) {
            return Arc::clone(g);
        }
        Arc::clone(self.gauges.write().entry(key).or_default())
    }

    /// Number of registered metrics
    pub fn len(&self) -> usize {
        self.counters.read().len() + self.gauges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut samples = Vec::with_capacity(self.len());
        for (key, counter) in self.counters.read().iter() {
            samples.push(self.sample(key, MetricKind::Counter, counter.get() as i64));
        }
        for (key, gauge) in self.gauges.read().iter() {
            samples.push(self.sample(key, MetricKind::Gauge, gauge.get()));
        }
        MetricsSnapshot {
            taken_at: Instant::now(),
            samples,
        }
    }

    fn sample(&self, key: &MetricKey, kind: MetricKind, value: i64) -> Sample {
        let labels = self
            .common_labels
            .iter()
            .chain(key.labels.iter())
            .cloned()
            .collect();
        Sample {
            name: key.name.clone(),
            labels,
            kind,
            value,
        }
    }
}
