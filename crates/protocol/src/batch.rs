//! Batch - fixed-capacity ring of output contexts
//!
//! The sender keeps one open batch per partition. Contexts are appended in
//! dequeue order, so the last offset is the one to acknowledge once the batch
//! has been handed upstream.

use std::collections::VecDeque;

use crate::{Event, EventType, Offset, OutputContext};

/// Fixed-capacity ring of output contexts
#[derive(Debug, Clone)]
pub struct Batch {
    contexts: VecDeque<OutputContext>,
    capacity: usize,
}

impl Batch {
    /// Create an empty batch holding at most `capacity` contexts
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            contexts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a context
    ///
    /// Returns the context back if the batch is already full.
    pub fn push(&mut self, ctx: OutputContext) -> Result<(), OutputContext> {
        if self.is_full() {
            return Err(ctx);
        }
        self.contexts.push_back(ctx);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.contexts.len() >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offset of the oldest context
    pub fn first_offset(&self) -> Option<Offset> {
        self.contexts.front().map(OutputContext::offset)
    }

    /// Offset of the newest context
    pub fn last_offset(&self) -> Option<Offset> {
        self.contexts.back().map(OutputContext::offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputContext> {
        self.contexts.iter()
    }

    /// Remote events grouped by type, preserving context order within a group
    pub fn group_remote_by_type(&self) -> Vec<(EventType, Vec<Event>)> {
        let mut groups: Vec<(EventType, Vec<Event>)> = Vec::new();
        for event in self.contexts.iter().flat_map(OutputContext::remote_events) {
            match groups.iter_mut().find(|(t, _)| *t == event.event_type) {
                Some((_, events)) => events.push(event.clone()),
                None => groups.push((event.event_type, vec![event.clone()])),
            }
        }
        groups
    }
}
