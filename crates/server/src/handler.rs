//! Per-event-type handler registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use satellite_protocol::{Event, EventType};

use crate::error::{HandlerError, Result, ServerError};

/// Receives decoded events of the types it registered for
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Accept a batch of events of one type
    async fn handle(&self, events: Vec<Event>) -> std::result::Result<(), HandlerError>;

    /// Answer a request/response event
    async fn handle_sync(&self, event: Event) -> std::result::Result<Event, HandlerError> {
        Err(HandlerError::unimplemented(format!(
            "{} does not support sync requests",
            event.event_type
        )))
    }
}

/// Event type to handler map, written at startup and read per frame
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventType, Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn register(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> Result<()> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&event_type) {
            return Err(ServerError::DuplicateHandler(event_type));
        }
        handlers.insert(event_type, handler);
        Ok(())
    }

    pub fn get(&self, event_type: EventType) -> Option<Arc<dyn EventHandler>> {
        self.handlers.read().get(&event_type).cloned()
    }

    pub fn registered(&self) -> Vec<EventType> {
        let mut types: Vec<_> = self.handlers.read().keys().copied().collect();
        types.sort_by_key(|t| t.as_u8());
        types
    }

    /// Route a data frame's events to their handlers, grouped by type
    pub async fn dispatch(&self, events: Vec<Event>) -> std::result::Result<(), HandlerError> {
        let mut groups: Vec<(EventType, Vec<Event>)> = Vec::new();
        for event in events {
            match groups.iter_mut().find(|(t, _)| *t == event.event_type) {
                Some((_, group)) => group.push(event),
                None => groups.push((event.event_type, vec![event])),
            }
        }
        for (event_type, group) in groups {
            let handler = self.get(event_type).ok_or_else(|| {
                HandlerError::unimplemented(format!("no receiver for {event_type}"))
            })?;
            handler.handle(group).await?;
        }
        Ok(())
    }

    pub async fn dispatch_sync(&self, event: Event) -> std::result::Result<Event, HandlerError> {
        let handler = self.get(event.event_type).ok_or_else(|| {
            HandlerError::unimplemented(format!("no receiver for {}", event.event_type))
        })?;
        handler.handle_sync(event).await
    }
}
