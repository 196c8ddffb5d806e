//! Native forwarder - data frames through a shared client

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use satellite_client::{CallContext, SharedClient};
use satellite_protocol::{Event, EventType, Frame, FrameKind, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{ForwardError, ForwardResult, Forwarder};

/// ```yaml
/// plugin_name: native-forwarder
/// forward_type: segment
/// routing_key_meta: trace_id
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NativeForwarderConfig {
    /// Event type handled by this forwarder
    /// Default: segment
    pub forward_type: EventType,

    /// Metadata key whose value routes a group of events to one backend
    pub routing_key_meta: Option<String>,
}

impl Default for NativeForwarderConfig {
    fn default() -> Self {
        Self {
            forward_type: EventType::Segment,
            routing_key_meta: None,
        }
    }
}

/// Sends each batch as data frames over the shared client
///
/// Without `routing_key_meta` a batch is one frame. With it, events are
/// grouped by that metadata value and each group is sent with the value as
/// routing key, so related events stick to one backend.
pub struct NativeForwarder {
    config: NativeForwarderConfig,
    client: Arc<SharedClient>,
}

impl NativeForwarder {
    pub fn new(config: NativeForwarderConfig, client: Arc<SharedClient>) -> Self {
        Self { config, client }
    }

    async fn send(&self, events: &[Event], mut ctx: CallContext) -> ForwardResult<()> {
        let frame = Frame::data(events)?;
        let reply = self.client.call(&frame, &mut ctx).await?;
        match reply.kind {
            FrameKind::Ack => Ok(()),
            other => Err(ForwardError::upstream(
                StatusCode::Internal,
                format!("expected ack, got {}", other.as_str()),
            )),
        }
    }

    fn group_by_key<'a>(&self, key: &str, events: &'a [Event]) -> BTreeMap<Option<&'a str>, Vec<Event>> {
        let mut groups: BTreeMap<Option<&str>, Vec<Event>> = BTreeMap::new();
        for event in events {
            groups
                .entry(event.meta.get(key).map(String::as_str))
                .or_default()
                .push(event.clone());
        }
        groups
    }
}

#[async_trait]
impl Forwarder for NativeForwarder {
    fn name(&self) -> &'static str {
        "native-forwarder"
    }

    fn forward_type(&self) -> EventType {
        self.config.forward_type
    }

    async fn forward(&self, events: &[Event]) -> ForwardResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let Some(meta_key) = self.config.routing_key_meta.as_deref() else {
            return self.send(events, CallContext::default()).await;
        };
        for (routing_key, group) in self.group_by_key(meta_key, events) {
            trace!(routing_key = ?routing_key, events = group.len(), "forwarding routed group");
            let ctx = routing_key.map_or_else(CallContext::default, CallContext::with_routing_key);
            self.send(&group, ctx).await?;
        }
        Ok(())
    }

    fn supports_sync(&self) -> bool {
        true
    }

    async fn sync_forward(&self, event: &Event) -> ForwardResult<Event> {
        let frame = Frame::sync_request(event)?;
        let mut ctx = self
            .config
            .routing_key_meta
            .as_deref()
            .and_then(|k| event.meta.get(k))
            .map_or_else(CallContext::default, CallContext::with_routing_key);
        let reply = self.client.call(&frame, &mut ctx).await?;
        if reply.kind != FrameKind::SyncResponse {
            return Err(ForwardError::upstream(
                StatusCode::Internal,
                format!("expected sync_response, got {}", reply.kind.as_str()),
            ));
        }
        Ok(reply.event()?)
    }
}
