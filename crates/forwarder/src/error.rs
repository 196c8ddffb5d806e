//! Forwarding errors

use satellite_client::ClientError;
use satellite_protocol::{ProtocolError, StatusCode};
use thiserror::Error;

pub type ForwardResult<T> = Result<T, ForwardError>;

/// Error returned by a forward attempt
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The upstream answered with, or the transport implied, a failure status
    #[error("upstream {code}: {message}")]
    Upstream { code: StatusCode, message: String },

    /// Events could not be framed
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),

    /// The forwarder has no request/response path
    #[error("forwarder {0} does not support sync forwarding")]
    SyncUnsupported(&'static str),

    #[error("invalid forwarder configuration: {0}")]
    Config(String),
}

impl ForwardError {
    pub fn upstream(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Upstream {
            code,
            message: message.into(),
        }
    }

    /// Status class used when reporting to the shared client
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Upstream { code, .. } => *code,
            Self::Encode(_) => StatusCode::Internal,
            Self::SyncUnsupported(_) => StatusCode::Unimplemented,
            Self::Config(_) => StatusCode::InvalidArgument,
        }
    }
}

impl From<ClientError> for ForwardError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Status { code, message } => Self::Upstream { code, message },
            other => Self::Upstream {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}
