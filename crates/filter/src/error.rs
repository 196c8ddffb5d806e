//! Filter error types

use thiserror::Error;

/// Result type for filter operations
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors that can occur building or running a filter
#[derive(Debug, Error)]
pub enum FilterError {
    /// Invalid configuration
    #[error("invalid filter configuration: {0}")]
    Config(String),

    /// A configured pattern does not compile
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Filter logic failed for one context
    #[error("filter {filter} failed: {message}")]
    Failed {
        filter: &'static str,
        message: String,
    },
}

impl FilterError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn failed(filter: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            filter,
            message: message.into(),
        }
    }
}
