//! Satellite Filter - Context filters run by the processor
//!
//! A filter sees one [`OutputContext`] at a time, seeded with the dequeued
//! event, and may add keyed events to it. Filters never touch the queue and
//! never remove or replace events already in the context.
//!
//! # Architecture
//!
//! ```text
//! [SequenceEvent] → OutputContext → [Filter 1] → [Filter 2] → ... → Sender
//! ```
//!
//! # Built-in filters
//!
//! - `noop` - leaves the context unchanged
//! - `metadata` - adds a labelled copy of the source event when its
//!   metadata matches the configured conditions
//!
//! # Example
//!
//! ```ignore
//! let chain = Chain::new(vec![Box::new(NoopFilter::new())]);
//! chain.process(&mut ctx)?;
//! ```

mod chain;
mod error;
pub mod metadata;
mod noop;

pub use chain::Chain;
pub use error::{FilterError, FilterResult};
pub use metadata::{Condition, MatchMode, MetadataFilter, MetadataFilterConfig};
pub use noop::NoopFilter;

use satellite_protocol::OutputContext;

/// A processing step over one output context
///
/// Implementors must be `Send + Sync`; one filter instance serves every
/// partition of its pipe.
pub trait Filter: Send + Sync {
    /// Inspect the context and add events to it
    ///
    /// An error drops nothing: the processor logs it and forwards the
    /// context as it stands.
    fn process(&self, ctx: &mut OutputContext) -> FilterResult<()>;

    /// Name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Disabled filters are left out of chains at construction time
    fn enabled(&self) -> bool {
        true
    }

    /// Release resources at shutdown
    fn close(&self) -> FilterResult<()> {
        Ok(())
    }
}
