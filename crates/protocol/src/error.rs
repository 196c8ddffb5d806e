//! Protocol error types
//!
//! Errors that can occur when decoding events or wire frames.

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message is too short to contain required fields
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort { expected: usize, actual: usize },

    /// Unsupported event encoding version
    #[error("unsupported event encoding version: {0}")]
    UnsupportedVersion(u8),

    /// Invalid event type value
    #[error("invalid event type: {0}")]
    InvalidEventType(u8),

    /// Unknown event type name
    #[error("unknown event type name: {0}")]
    UnknownEventType(String),

    /// Invalid frame kind value
    #[error("invalid frame kind: {0}")]
    InvalidFrameKind(u8),

    /// Unexpected frame kind for the requested decode
    #[error("unexpected frame kind: expected {expected}, got {actual}")]
    UnexpectedFrame {
        expected: &'static str,
        actual: &'static str,
    },

    /// Field contained invalid UTF-8
    #[error("invalid utf-8 in field {0}")]
    InvalidUtf8(&'static str),

    /// Frame exceeds maximum size
    #[error("frame size {size} exceeds limit {limit}")]
    FrameTooLarge { size: u32, limit: u32 },

    /// Field longer than its length prefix can describe
    #[error("field {field} too long: {len} bytes")]
    FieldTooLong { field: &'static str, len: usize },

    /// Underlying I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Create a message too short error
    #[inline]
    pub fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Create an unexpected frame error
    #[inline]
    pub fn unexpected_frame(expected: &'static str, actual: &'static str) -> Self {
        Self::UnexpectedFrame { expected, actual }
    }

    /// Check if this error means the peer sent garbage (as opposed to I/O failure)
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}
