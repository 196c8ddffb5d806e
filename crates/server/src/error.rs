//! Server error types

use std::io;

use satellite_protocol::{EventType, StatusCode};
use thiserror::Error;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors from the shared server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listener
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// `serve` called before `bind`
    #[error("server {0} is not bound")]
    NotBound(String),

    /// Two receivers claimed the same event type
    #[error("event type {0} already has a handler")]
    DuplicateHandler(EventType),

    /// Invalid server configuration
    #[error("invalid server config: {0}")]
    InvalidConfig(String),

    /// Connection I/O error
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Failure reported by a handler back to the sending agent
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct HandlerError {
    pub code: StatusCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ResourceExhausted, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unimplemented, message)
    }
}
