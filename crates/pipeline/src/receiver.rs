//! Native receiver - claims event types on a shared server

use std::sync::Arc;

use async_trait::async_trait;
use satellite_protocol::{Event, EventType};
use satellite_queue::{Queue, QueueError};
use satellite_server::{EventHandler, HandlerError, NativeServer};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metrics::PipelineMetrics;
use crate::offload;
use crate::rate_limited::RateLimitedLogger;
use crate::{PipelineError, Result, SyncInvoker};

/// ```yaml
/// plugin_name: native-receiver
/// event_types: [segment, log]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NativeReceiverConfig {
    /// Types this receiver claims on its server
    /// Default: [segment]
    pub event_types: Vec<EventType>,
}

impl Default for NativeReceiverConfig {
    fn default() -> Self {
        Self {
            event_types: vec![EventType::Segment],
        }
    }
}

/// Server handler that enqueues events into its pipe's queue
///
/// The handler never waits for room: when every partition is full the
/// events are dropped and counted. Request/response types go straight to
/// the sync invoker instead of the queue.
pub struct NativeReceiver {
    pipe: String,
    config: NativeReceiverConfig,
    queue: Arc<Queue>,
    sync: Option<Arc<dyn SyncInvoker>>,
    metrics: PipelineMetrics,
    drops: RateLimitedLogger,
}

impl NativeReceiver {
    pub fn new(pipe: impl Into<String>, config: NativeReceiverConfig, queue: Arc<Queue>) -> Self {
        Self {
            pipe: pipe.into(),
            config,
            queue,
            sync: None,
            metrics: PipelineMetrics::detached(),
            drops: RateLimitedLogger::default(),
        }
    }

    #[must_use]
    pub fn with_sync(mut self, invoker: Arc<dyn SyncInvoker>) -> Self {
        self.sync = Some(invoker);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &'static str {
        "native-receiver"
    }

    pub fn event_types(&self) -> &[EventType] {
        &self.config.event_types
    }

    /// Claim every configured type on `server`
    pub fn register(self: &Arc<Self>, server: &NativeServer) -> Result<()> {
        for event_type in &self.config.event_types {
            server.register(*event_type, Arc::clone(self) as Arc<dyn EventHandler>)?;
        }
        info!(pipe = %self.pipe, server = server.name(), event_types = ?self.config.event_types, "receiver registered");
        Ok(())
    }

    async fn enqueue(&self, event: Event) -> std::result::Result<(), QueueError> {
        self.metrics.received.inc();
        match offload::enqueue(&self.queue, event).await {
            Ok(_) => {
                self.metrics.enqueued.inc();
                Ok(())
            }
            Err(e) if e.is_fatal() || matches!(e, QueueError::Closed) => Err(e),
            Err(e) => {
                self.metrics.dropped.inc();
                self.drops.warn(&self.pipe, "event dropped", &e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl EventHandler for NativeReceiver {
    async fn handle(&self, events: Vec<Event>) -> std::result::Result<(), HandlerError> {
        for event in events {
            self.enqueue(event)
                .await
                .map_err(|e| HandlerError::unavailable(format!("pipe {} cannot accept events: {e}", self.pipe)))?;
        }
        Ok(())
    }

    async fn handle_sync(&self, event: Event) -> std::result::Result<Event, HandlerError> {
        let Some(invoker) = &self.sync else {
            return Err(HandlerError::unimplemented(format!(
                "pipe {} has no sync path",
                self.pipe
            )));
        };
        self.metrics.received.inc();
        invoker.sync_invoke(event).await.map_err(|e| match e {
            PipelineError::NoSyncForwarder(_) => HandlerError::unimplemented(e.to_string()),
            PipelineError::Forward(f) => HandlerError::new(f.code(), f.to_string()),
            other => HandlerError::unavailable(other.to_string()),
        })
    }
}
