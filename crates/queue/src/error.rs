//! Queue error types

use std::io;
use std::path::PathBuf;

use satellite_protocol::ProtocolError;
use thiserror::Error;

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur on a queue partition
#[derive(Debug, Error)]
pub enum QueueError {
    /// No room for another record; retry is at the caller's discretion
    #[error("queue is full")]
    Full,

    /// Nothing to dequeue; the caller should park and poll again
    #[error("queue is empty")]
    Empty,

    /// Record exceeds the configured maximum event size
    #[error("event of {size} bytes exceeds max event size {max}")]
    EventTooLarge { size: usize, max: usize },

    /// Metadata file was written by an incompatible layout
    #[error("meta file {path} mismatch: {field} is {found}, expected {expected}")]
    MetaMismatch {
        path: PathBuf,
        field: &'static str,
        found: u64,
        expected: u64,
    },

    /// Persisted data cannot be interpreted
    #[error("queue data corrupted at {location}: {message}")]
    Corrupted { location: String, message: String },

    /// Segment or meta file I/O failure
    #[error("queue io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored record could not be decoded
    #[error("failed to decode stored event: {0}")]
    Decode(#[from] ProtocolError),

    /// Invalid queue configuration
    #[error("invalid queue config: {0}")]
    InvalidConfig(String),

    /// Partition has been closed
    #[error("queue partition is closed")]
    Closed,
}

impl QueueError {
    /// Create an I/O error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a corruption error
    pub fn corrupted(location: impl ToString, message: impl Into<String>) -> Self {
        Self::Corrupted {
            location: location.to_string(),
            message: message.into(),
        }
    }

    /// Whether the condition is expected under normal load
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Full | Self::Empty)
    }

    /// Whether the pipe owning this queue should stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MetaMismatch { .. } | Self::Corrupted { .. } | Self::Io { .. }
        )
    }
}
