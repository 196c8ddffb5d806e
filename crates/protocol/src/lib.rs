//! Satellite Protocol - Core types that flow through a pipeline
//!
//! This crate provides the foundational types shared by every stage:
//! - `Event` / `EventType` - typed payload plus envelope
//! - `Offset` / `Position` - queue-local, partition-scoped positions
//! - `SequenceEvent` - an event paired with the offset it was read at
//! - `OutputContext` - the unit the processor hands to the sender
//! - `Batch` - fixed-capacity ring of output contexts
//! - `Frame` - length-prefixed native wire frames
//! - `StatusCode` - upstream status classification
//!
//! # Design Principles
//!
//! - **Cheap clones**: payloads are `bytes::Bytes`
//! - **Stable encoding**: the event record layout is what the durable queue persists
//! - **No runtime knowledge**: nothing here spawns tasks or touches the filesystem

mod batch;
mod context;
mod error;
mod event;
mod event_type;
mod frame;
mod offset;
mod status;

pub use batch::Batch;
pub use context::{OutputContext, SequenceEvent};
pub use error::ProtocolError;
pub use event::Event;
pub use event_type::EventType;
pub use frame::{
    Frame, FrameKind, decode_frame, encode_frame, peek_frame_len, read_frame, write_frame,
};
pub use offset::{Offset, Position};
pub use status::StatusCode;

pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Maximum frame size on the wire (16MB)
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Frame length prefix size (4 bytes, big-endian u32)
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Current event record encoding version
pub const EVENT_ENCODING_VERSION: u8 = 1;
