//! Satellite Forwarder - Typed upstream writers and their retry policies
//!
//! The sender groups every flushed batch by event type and hands each group
//! to the [`Forwarder`] whose `forward_type` matches. A failed attempt is
//! passed to the pipe's [`Fallbacker`], which decides whether and how often
//! to try again. Whatever the outcome, the sender then acknowledges the
//! batch.
//!
//! # Built-in plugins
//!
//! | Plugin | Kind | Description |
//! |--------|------|-------------|
//! | `native-forwarder` | forwarder | Native data frames through the shared client |
//! | `timer-fallbacker` | fallbacker | Capped exponential back-off |
//! | `none-fallbacker` | fallbacker | Gives up after the first attempt |

mod error;
mod fallback;
mod native;

pub use error::{ForwardError, ForwardResult};
pub use fallback::{Fallbacker, NoneFallbacker, TimerFallbacker, TimerFallbackerConfig};
pub use native::{NativeForwarder, NativeForwarderConfig};

use async_trait::async_trait;
use satellite_protocol::{Event, EventType};

/// Writes batches of one event type upstream
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Plugin name
    fn name(&self) -> &'static str;

    /// The only event type this forwarder accepts
    fn forward_type(&self) -> EventType;

    /// Deliver one batch of events
    async fn forward(&self, events: &[Event]) -> ForwardResult<()>;

    /// Whether [`sync_forward`](Self::sync_forward) is implemented
    fn supports_sync(&self) -> bool {
        false
    }

    /// Deliver one event and wait for the upstream's answer
    async fn sync_forward(&self, _event: &Event) -> ForwardResult<Event> {
        Err(ForwardError::SyncUnsupported(self.name()))
    }
}
