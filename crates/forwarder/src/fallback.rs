//! Retry policies around a failed forward

use std::time::Duration;

use async_trait::async_trait;
use satellite_protocol::Event;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ForwardError, ForwardResult, Forwarder};

/// Decides what happens after a forward attempt failed
#[async_trait]
pub trait Fallbacker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Retry `events` on `forwarder` after `first` failed
    ///
    /// Returns the last error if every retry failed.
    async fn fallback(
        &self,
        forwarder: &dyn Forwarder,
        events: &[Event],
        first: ForwardError,
    ) -> ForwardResult<()>;
}

/// Gives up immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneFallbacker;

#[async_trait]
impl Fallbacker for NoneFallbacker {
    fn name(&self) -> &'static str {
        "none-fallbacker"
    }

    async fn fallback(
        &self,
        _forwarder: &dyn Forwarder,
        _events: &[Event],
        first: ForwardError,
    ) -> ForwardResult<()> {
        Err(first)
    }
}

/// Timer fallbacker configuration
///
/// ```yaml
/// plugin_name: timer-fallbacker
/// max_attempts: 3
/// latency_factor: 2s
/// max_backoff: 5s
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimerFallbackerConfig {
    /// Total attempts including the one that already failed
    /// Default: 3
    pub max_attempts: u32,

    /// Delay before the first retry, doubled after each one
    /// Default: 2s
    #[serde(with = "humantime_serde")]
    pub latency_factor: Duration,

    /// Upper bound on any single delay
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for TimerFallbackerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            latency_factor: Duration::from_secs(2),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl TimerFallbackerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.max_backoff < self.latency_factor {
            return Err("max_backoff must not be below latency_factor".into());
        }
        Ok(())
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        self.latency_factor
            .saturating_mul(1 << retry.min(16))
            .min(self.max_backoff)
    }
}

/// Capped exponential back-off retrier
#[derive(Debug, Clone)]
pub struct TimerFallbacker {
    config: TimerFallbackerConfig,
}

impl TimerFallbacker {
    pub fn new(config: TimerFallbackerConfig) -> ForwardResult<Self> {
        config.validate().map_err(ForwardError::Config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TimerFallbackerConfig {
        &self.config
    }
}

#[async_trait]
impl Fallbacker for TimerFallbacker {
    fn name(&self) -> &'static str {
        "timer-fallbacker"
    }

    async fn fallback(
        &self,
        forwarder: &dyn Forwarder,
        events: &[Event],
        first: ForwardError,
    ) -> ForwardResult<()> {
        let mut last = first;
        for retry in 0..self.config.max_attempts.saturating_sub(1) {
            let delay = self.config.delay(retry);
            debug!(
                forwarder = forwarder.name(),
                attempt = retry + 2,
                delay_ms = delay.as_millis() as u64,
                error = %last,
                "retrying forward after delay"
            );
            tokio::time::sleep(delay).await;
            match forwarder.forward(events).await {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }
        warn!(
            forwarder = forwarder.name(),
            attempts = self.config.max_attempts,
            events = events.len(),
            error = %last,
            "forward failed after all attempts"
        );
        Err(last)
    }
}
