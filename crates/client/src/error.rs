//! Client error types

use std::io;
use std::path::PathBuf;

use satellite_protocol::{ProtocolError, StatusCode};
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur talking to the upstream
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid client configuration
    #[error("invalid client config: {0}")]
    InvalidConfig(String),

    /// TLS material could not be loaded
    #[error("tls error for {path}: {message}")]
    Tls { path: PathBuf, message: String },

    /// TCP or TLS connect failed
    #[error("connection failed to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Operation did not complete in time
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// No backend available to pick
    #[error("no ready upstream address")]
    NoReadyBackend,

    /// Upstream replied with an error status
    #[error("upstream returned {code}: {message}")]
    Status { code: StatusCode, message: String },

    /// Malformed frame from the upstream
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Address discovery failed
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// Client has been closed
    #[error("client is closed")]
    Closed,
}

impl ClientError {
    pub fn tls(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Tls {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Status class of this error as the sender sees it
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Status { code, .. } => *code,
            Self::Connect { .. } | Self::Timeout(_) | Self::NoReadyBackend | Self::Closed => {
                StatusCode::Unavailable
            }
            Self::Protocol(e) if !e.is_malformed() => StatusCode::Unavailable,
            Self::Protocol(_) => StatusCode::Internal,
            Self::InvalidConfig(_) | Self::Tls { .. } => StatusCode::InvalidArgument,
            Self::Discovery(_) => StatusCode::Unknown,
        }
    }

    /// Whether the error should flip the client to `Disconnect`
    pub fn is_disconnect(&self) -> bool {
        self.code().is_disconnect()
    }
}
