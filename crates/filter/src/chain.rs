//! Filter chain - sequential context processing
//!
//! - Empty chain is a no-op
//! - Filters run in configured order, each seeing what earlier ones added
//! - A failing filter is logged and skipped; later filters still run

use satellite_protocol::OutputContext;
use tracing::debug;

use crate::{Filter, FilterError};

#[cfg(test)]
#[path = "chain_test.rs"]
mod tests;

/// Ordered list of filters
pub struct Chain {
    filters: Vec<Box<dyn Filter>>,
}

impl Chain {
    /// Build a chain from the enabled filters in `filters`
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self {
            filters: filters.into_iter().filter(|f| f.enabled()).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every filter over `ctx`, returning the errors of those that failed
    pub fn process(&self, ctx: &mut OutputContext) -> Vec<FilterError> {
        let mut errors = Vec::new();
        for filter in &self.filters {
            if let Err(e) = filter.process(ctx) {
                debug!(filter = filter.name(), offset = %ctx.offset(), error = %e, "filter failed");
                errors.push(e);
            }
        }
        errors
    }

    /// Close every filter, returning the first error
    pub fn close(&self) -> Result<(), FilterError> {
        let mut first = None;
        for filter in &self.filters {
            if let Err(e) = filter.close() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::empty()
    }
}
