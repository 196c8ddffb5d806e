//! Metadata filter configuration

use std::collections::BTreeMap;

use satellite_protocol::EventType;
use serde::{Deserialize, Serialize};

/// How conditions combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every condition must hold
    #[default]
    All,
    /// One condition is enough
    Any,
}

/// Comparison applied to one metadata value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Contains,
    StartsWith,
    Regex,
    Exists,
}

/// One test against the source event's metadata
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Condition {
    /// Metadata key
    pub key: String,
    pub operator: Operator,
    /// Ignored by `exists`
    #[serde(default)]
    pub value: Option<String>,
}

impl Condition {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with(key, Operator::Eq, Some(value.into()))
    }

    pub fn regex(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with(key, Operator::Regex, Some(pattern.into()))
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self::with(key, Operator::Exists, None)
    }

    fn with(key: impl Into<String>, operator: Operator, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            value,
        }
    }
}

/// Configuration for [`MetadataFilter`](super::MetadataFilter)
///
/// ```yaml
/// plugin_name: metadata
/// output_name: tagged
/// labels:
///   region: eu-west-1
/// match_mode: all
/// conditions:
///   - key: service
///     operator: regex
///     value: "^checkout-"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataFilterConfig {
    /// Key of the added event in the context
    /// Default: "labelled"
    pub output_name: String,

    /// Metadata merged into the copy, overriding source keys
    pub labels: BTreeMap<String, String>,

    /// Retag the copy with another event type
    pub event_type: Option<EventType>,

    /// Whether the copy is forwarded upstream
    /// Default: true
    pub remote: bool,

    pub match_mode: MatchMode,

    /// Empty means every event matches
    pub conditions: Vec<Condition>,
}

impl Default for MetadataFilterConfig {
    fn default() -> Self {
        Self {
            output_name: "labelled".into(),
            labels: BTreeMap::new(),
            event_type: None,
            remote: true,
            match_mode: MatchMode::All,
            conditions: Vec::new(),
        }
    }
}

impl MetadataFilterConfig {
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    /// Check structure; regex compilation happens when the filter is built
    pub fn validate(&self) -> Result<(), String> {
        if self.output_name.is_empty() {
            return Err("output_name must not be empty".into());
        }
        for condition in &self.conditions {
            if condition.key.is_empty() {
                return Err("condition key must not be empty".into());
            }
            if condition.operator != Operator::Exists && condition.value.is_none() {
                return Err(format!(
                    "condition on {:?} needs a value for {:?}",
                    condition.key, condition.operator
                ));
            }
        }
        Ok(())
    }
}
