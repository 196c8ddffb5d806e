//! Built-in plugins
//!
//! One unit-struct factory per plugin, grouped by the pipe stage it serves.

mod gatherer;
mod processor;
mod queue;
mod sender;
mod sharing;
mod telemetry;

pub use gatherer::{NativeReceiverFactory, SelfMeterFactory};
pub use processor::{MetadataFilterFactory, NoopFilterFactory};
pub use queue::{MemoryQueueFactory, MmapQueueFactory, NoneQueueFactory};
pub use sender::{NativeForwarderFactory, NoneFallbackerFactory, TimerFallbackerFactory};
pub use sharing::{NativeClientFactory, NativeServerFactory};
pub use telemetry::{LogSinkFactory, NoneSinkFactory};

use satellite_config::PluginConfig;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::registry::{Category, PluginRegistry, invalid};

/// Register every built-in factory
pub fn register_builtin(registry: &mut PluginRegistry) -> Result<()> {
    registry.clients.register(NativeClientFactory)?;
    registry.servers.register(NativeServerFactory)?;

    registry.receivers.register(NativeReceiverFactory)?;
    registry.fetchers.register(SelfMeterFactory)?;

    registry.queues.register(MmapQueueFactory)?;
    registry.queues.register(MemoryQueueFactory)?;
    registry.queues.register(NoneQueueFactory)?;

    registry.filters.register(NoopFilterFactory)?;
    registry.filters.register(MetadataFilterFactory)?;

    registry.forwarders.register(NativeForwarderFactory)?;
    registry.fallbackers.register(TimerFallbackerFactory)?;
    registry.fallbackers.register(NoneFallbackerFactory)?;

    registry.sinks.register(NoneSinkFactory)?;
    registry.sinks.register(LogSinkFactory)?;
    Ok(())
}

/// Deserialize a merged plugin map into its typed config
fn typed<T: DeserializeOwned>(category: Category, plugin: &str, config: &PluginConfig) -> Result<T> {
    config
        .parse()
        .map_err(|e| invalid(category, plugin, e))
}
