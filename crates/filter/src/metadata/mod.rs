//! Metadata filter - labelled copies of matching events
//!
//! When the source event's metadata satisfies the configured conditions, a
//! copy of it is added to the context under `output_name`, with `labels`
//! merged into its metadata. The source event itself is left untouched.
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | `output_name` | string | `"labelled"` | Context key of the copy |
//! | `labels` | map | `{}` | Metadata added to the copy |
//! | `event_type` | string | source type | Type tag of the copy |
//! | `remote` | bool | `true` | Whether the copy is forwarded |
//! | `match_mode` | string | `"all"` | `all` or `any` |
//! | `conditions` | array | `[]` | `key` / `operator` / `value` tests |

mod config;

pub use config::{Condition, MatchMode, MetadataFilterConfig, Operator};

use regex::Regex;
use satellite_protocol::{Event, OutputContext};
use tracing::trace;

use crate::{Filter, FilterError, FilterResult};

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

enum Matcher {
    Eq(String),
    Ne(String),
    Contains(String),
    StartsWith(String),
    Regex(Regex),
    Exists,
}

struct CompiledCondition {
    key: String,
    matcher: Matcher,
}

impl CompiledCondition {
    fn compile(condition: &Condition) -> FilterResult<Self> {
        let value = condition.value.clone().unwrap_or_default();
        let matcher = match condition.operator {
            Operator::Eq => Matcher::Eq(value),
            Operator::Ne => Matcher::Ne(value),
            Operator::Contains => Matcher::Contains(value),
            Operator::StartsWith => Matcher::StartsWith(value),
            Operator::Exists => Matcher::Exists,
            Operator::Regex => Matcher::Regex(Regex::new(&value).map_err(|source| {
                FilterError::InvalidRegex {
                    pattern: value.clone(),
                    source,
                }
            })?),
        };
        Ok(Self {
            key: condition.key.clone(),
            matcher,
        })
    }

    fn matches(&self, event: &Event) -> bool {
        let Some(found) = event.meta.get(&self.key) else {
            // a missing key satisfies only `ne`
            return matches!(self.matcher, Matcher::Ne(_));
        };
        match &self.matcher {
            Matcher::Eq(v) => found == v,
            Matcher::Ne(v) => found != v,
            Matcher::Contains(v) => found.contains(v.as_str()),
            Matcher::StartsWith(v) => found.starts_with(v.as_str()),
            Matcher::Regex(re) => re.is_match(found),
            Matcher::Exists => true,
        }
    }
}

/// Adds a labelled copy of the source event to the context
pub struct MetadataFilter {
    config: MetadataFilterConfig,
    conditions: Vec<CompiledCondition>,
}

impl MetadataFilter {
    /// Build the filter, compiling every regex condition
    pub fn new(config: MetadataFilterConfig) -> FilterResult<Self> {
        config.validate().map_err(FilterError::config)?;
        let conditions = config
            .conditions
            .iter()
            .map(CompiledCondition::compile)
            .collect::<FilterResult<Vec<_>>>()?;
        Ok(Self { config, conditions })
    }

    pub fn config(&self) -> &MetadataFilterConfig {
        &self.config
    }

    fn matches(&self, event: &Event) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        match self.config.match_mode {
            MatchMode::All => self.conditions.iter().all(|c| c.matches(event)),
            MatchMode::Any => self.conditions.iter().any(|c| c.matches(event)),
        }
    }

    fn labelled_copy(&self, source: &Event) -> Event {
        let mut copy = source.clone();
        copy.name = self.config.output_name.clone();
        copy.remote = self.config.remote;
        if let Some(event_type) = self.config.event_type {
            copy.event_type = event_type;
        }
        for (k, v) in &self.config.labels {
            copy.meta.insert(k.clone(), v.clone());
        }
        copy
    }
}

impl Filter for MetadataFilter {
    fn process(&self, ctx: &mut OutputContext) -> FilterResult<()> {
        let Some(source) = ctx.source() else {
            return Ok(());
        };
        if !self.matches(source) {
            trace!(offset = %ctx.offset(), "metadata conditions not met");
            return Ok(());
        }
        let copy = self.labelled_copy(source);
        if !ctx.insert(self.config.output_name.clone(), copy) {
            return Err(FilterError::failed(
                "metadata",
                format!("context already holds {:?}", self.config.output_name),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "metadata"
    }
}
