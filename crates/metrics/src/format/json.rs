//! JSON metrics formatter
//!
//! Formats a snapshot as one structured JSON object for machine parsing.
//!
//! # Example Output
//!
//! ```json
//! {"type":"metrics","samples":[{"name":"queue_enqueued","labels":{...},"kind":"counter","value":12,"rate":0.4}]}
//! ```

use serde::Serialize;

use super::MetricsFormatter;
use crate::{MetricsSnapshot, Sample};

/// JSON metrics formatter
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct ReportJson<'a> {
    #[serde(rename = "type")]
    report_type: &'static str,
    samples: Vec<SampleJson<'a>>,
}

#[derive(Serialize)]
struct SampleJson<'a> {
    #[serde(flatten)]
    sample: &'a Sample,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate: Option<f64>,
}

impl MetricsFormatter for JsonFormatter {
    fn format(&self, snapshot: &MetricsSnapshot, previous: Option<&MetricsSnapshot>) -> String {
        let rates = previous.map(|p| snapshot.rates(p)).unwrap_or_default();
        let samples = snapshot
            .samples
            .iter()
            .map(|sample| SampleJson {
                sample,
                rate: rates
                    .iter()
                    .find(|(s, _)| std::ptr::eq(*s, sample))
                    .map(|(_, r)| *r),
            })
            .collect();

        serde_json::to_string(&ReportJson {
            report_type: "metrics",
            samples,
        })
        .unwrap_or_else(|e| format!("{{\"type\":\"error\",\"message\":\"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsRegistry;

    #[test]
    fn test_json_is_parseable() {
        let registry = MetricsRegistry::default();
        registry.counter("forwarded", &[("forwarder", "native")]).add(9);

        let out = JsonFormatter::new().format(&registry.snapshot(), None);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["type"], "metrics");
        assert_eq!(value["samples"][0]["name"], "forwarded");
        assert_eq!(value["samples"][0]["value"], 9);
        assert_eq!(value["samples"][0]["kind"], "counter");
    }
}
