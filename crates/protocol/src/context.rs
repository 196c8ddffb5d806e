//! Processing units passed between pipeline stages

use std::collections::BTreeMap;

use crate::{Event, EventType, Offset};

/// An event paired with the offset it was dequeued at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceEvent {
    pub event: Event,
    pub offset: Offset,
}

impl SequenceEvent {
    pub fn new(event: Event, offset: Offset) -> Self {
        Self { event, offset }
    }
}

/// The unit a processor emits for one dequeued event
///
/// Seeded with the source event under its own name. Filters may add further
/// keyed events but never replace or remove existing ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputContext {
    offset: Offset,
    source: String,
    events: BTreeMap<String, Event>,
}

impl OutputContext {
    /// Seed a context from a dequeued event
    pub fn new(seq: SequenceEvent) -> Self {
        let source = seq.event.name.clone();
        let mut events = BTreeMap::new();
        events.insert(source.clone(), seq.event);
        Self {
            offset: seq.offset,
            source,
            events,
        }
    }

    /// The event the context was seeded with
    pub fn source(&self) -> Option<&Event> {
        self.events.get(&self.source)
    }

    /// Offset of the source event
    #[inline]
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Add a keyed event
    ///
    /// Returns `false` (and leaves the context untouched) if the key is taken.
    pub fn insert(&mut self, name: impl Into<String>, event: Event) -> bool {
        use std::collections::btree_map::Entry;
        match self.events.entry(name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(event);
                true
            }
        }
    }

    /// Look up an event by key
    pub fn get(&self, name: &str) -> Option<&Event> {
        self.events.get(name)
    }

    /// Number of events in the context
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events keyed by name
    pub fn events(&self) -> impl Iterator<Item = (&str, &Event)> {
        self.events.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Events that must be forwarded upstream
    pub fn remote_events(&self) -> impl Iterator<Item = &Event> {
        self.events.values().filter(|e| e.remote)
    }

    /// Remote events of one type
    pub fn remote_events_of(&self, event_type: EventType) -> impl Iterator<Item = &Event> {
        self.remote_events()
            .filter(move |e| e.event_type == event_type)
    }
}
