//! Pipeline error types

use satellite_forwarder::ForwardError;
use satellite_protocol::EventType;
use satellite_queue::QueueError;
use satellite_server::ServerError;
use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Queue failure; fatal ones stop the pipe
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Forwarder failure surfaced on the sync path
    #[error("forward error: {0}")]
    Forward(#[from] ForwardError),

    /// Receiver registration failed
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// No forwarder answers request/response events of this type
    #[error("no sync forwarder for event type {0}")]
    NoSyncForwarder(EventType),

    /// A fetcher could not produce events
    #[error("fetcher {fetcher} failed: {message}")]
    Fetch {
        fetcher: &'static str,
        message: String,
    },

    /// A stage was already started or its channels are gone
    #[error("{0} is not available")]
    Unavailable(&'static str),

    /// A stage task panicked or was aborted
    #[error("task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub fn fetch(fetcher: &'static str, message: impl Into<String>) -> Self {
        Self::Fetch {
            fetcher,
            message: message.into(),
        }
    }

    /// Whether the owning pipe must stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Queue(e) => e.is_fatal(),
            Self::Task(_) => true,
            _ => false,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
