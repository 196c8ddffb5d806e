//! Forwarder and fallbacker plugins

use std::sync::Arc;

use satellite_config::PluginConfig;
use satellite_forwarder::{
    Fallbacker, Forwarder, NativeForwarder, NativeForwarderConfig, NoneFallbacker,
    TimerFallbacker, TimerFallbackerConfig,
};

use super::typed;
use crate::error::Result;
use crate::registry::{BuildContext, Category, PluginFactory, invalid};

pub struct NativeForwarderFactory;

impl PluginFactory<Arc<dyn Forwarder>> for NativeForwarderFactory {
    fn name(&self) -> &'static str {
        "native-forwarder"
    }

    fn description(&self) -> &'static str {
        "Sends each batch of one event type to the upstream over the pipe's shared \
         client. With routing_key_meta set, events are grouped by that metadata value \
         and each group sticks to one backend. Also serves request/response calls."
    }

    fn default_config(&self) -> &'static str {
        r#"
# Event type this forwarder handles
forward_type: segment
# Metadata key used as routing key; unset sends each batch as one call
routing_key_meta: ~
"#
    }

    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<Arc<dyn Forwarder>> {
        let cfg: NativeForwarderConfig = typed(Category::Forwarder, self.name(), config)?;
        if cfg.routing_key_meta.as_deref() == Some("") {
            return Err(invalid(Category::Forwarder, self.name(), "routing_key_meta must not be empty"));
        }
        let client = ctx.require_client(Category::Forwarder, self.name())?;
        Ok(Arc::new(NativeForwarder::new(cfg, Arc::clone(client))))
    }
}

pub struct TimerFallbackerFactory;

impl PluginFactory<Arc<dyn Fallbacker>> for TimerFallbackerFactory {
    fn name(&self) -> &'static str {
        "timer-fallbacker"
    }

    fn description(&self) -> &'static str {
        "Retries a failed batch with capped exponential back-off: the first retry \
         waits latency_factor, each later one twice as long, never more than max_backoff."
    }

    fn default_config(&self) -> &'static str {
        r#"
# Attempts per batch, counting the first send
max_attempts: 3
latency_factor: 2s
max_backoff: 5s
"#
    }

    fn create(&self, config: &PluginConfig, _ctx: &BuildContext<'_>) -> Result<Arc<dyn Fallbacker>> {
        let cfg: TimerFallbackerConfig = typed(Category::Fallbacker, self.name(), config)?;
        Ok(Arc::new(TimerFallbacker::new(cfg)?))
    }
}

pub struct NoneFallbackerFactory;

impl PluginFactory<Arc<dyn Fallbacker>> for NoneFallbackerFactory {
    fn name(&self) -> &'static str {
        "none-fallbacker"
    }

    fn description(&self) -> &'static str {
        "Gives up after the first failure."
    }

    fn create(&self, _config: &PluginConfig, _ctx: &BuildContext<'_>) -> Result<Arc<dyn Fallbacker>> {
        Ok(Arc::new(NoneFallbacker))
    }
}
