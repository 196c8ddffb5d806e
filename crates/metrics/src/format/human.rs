//! Human-readable metrics formatter
//!
//! One line per metric family, labels other than the common ones inline.
//!
//! # Example Output
//!
//! ```text
//! [metrics] queue_enqueued: pipe=trace,partition=0 1.2K (40/s) | pipe=trace,partition=1 1.1K (38/s)
//! [metrics] server_connections: server=native-server 12
//! ```

use std::collections::BTreeMap;
use std::fmt::Write;

use super::{MetricsFormatter, format_count, format_rate};
use crate::{MetricKind, MetricsSnapshot, Sample};

const COMMON_LABELS: [&str; 3] = ["cluster", "service", "instance"];

/// Human-readable metrics formatter
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter;

impl HumanFormatter {
    pub fn new() -> Self {
        Self
    }

    fn label_string(sample: &Sample) -> String {
        sample
            .labels
            .iter()
            .filter(|(k, _)| !COMMON_LABELS.contains(&k.as_str()))
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl MetricsFormatter for HumanFormatter {
    fn format(&self, snapshot: &MetricsSnapshot, previous: Option<&MetricsSnapshot>) -> String {
        let rates: Vec<(&Sample, f64)> = previous.map(|p| snapshot.rates(p)).unwrap_or_default();

        let mut families: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
        for sample in &snapshot.samples {
            families.entry(sample.name.as_str()).or_default().push(sample);
        }

        let mut output = String::new();
        for (name, samples) in families {
            if !output.is_empty() {
                output.push('\n');
            }
            let _ = write!(output, "[metrics] {name}:");
            for (i, sample) in samples.iter().enumerate() {
                if i > 0 {
                    output.push_str(" |");
                }
                let labels = Self::label_string(sample);
                if !labels.is_empty() {
                    let _ = write!(output, " {labels}");
                }
                let _ = write!(output, " {}", format_count(sample.value));
                if sample.kind == MetricKind::Counter
                    && let Some((_, rate)) = rates.iter().find(|(s, _)| std::ptr::eq(*s, *sample))
                {
                    let _ = write!(output, " ({})", format_rate(*rate));
                }
            }
        }
        output
    }
}
