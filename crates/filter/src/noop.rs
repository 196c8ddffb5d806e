//! Pass-through filter

use satellite_protocol::OutputContext;

use crate::{Filter, FilterResult};

/// Leaves every context unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFilter;

impl NoopFilter {
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Filter for NoopFilter {
    fn process(&self, _ctx: &mut OutputContext) -> FilterResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
