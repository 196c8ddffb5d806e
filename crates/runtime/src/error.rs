//! Runtime error types

use std::io;

use satellite_client::ClientError;
use satellite_config::ConfigError;
use satellite_filter::FilterError;
use satellite_forwarder::ForwardError;
use satellite_metrics::MetricsError;
use satellite_pipeline::PipelineError;
use satellite_queue::QueueError;
use satellite_server::ServerError;
use thiserror::Error;

use crate::registry::Category;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown {category} plugin '{name}', available: [{available}]")]
    UnknownPlugin {
        category: Category,
        name: String,
        available: String,
    },

    #[error("{category} plugin '{name}' is already registered")]
    DuplicatePlugin {
        category: Category,
        name: &'static str,
    },

    #[error("{category} plugin '{name}' has an invalid default config: {source}")]
    BadDefaults {
        category: Category,
        name: &'static str,
        #[source]
        source: ConfigError,
    },

    #[error("{category} plugin '{plugin}' requires a {resource}")]
    MissingShared {
        category: Category,
        plugin: String,
        resource: &'static str,
    },

    #[error("plugin '{plugin}': {message}")]
    Plugin { plugin: String, message: String },

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("forwarder error: {0}")]
    Forward(#[from] ForwardError),

    #[error("telemetry error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("every pipe stopped before shutdown ({failed} failed)")]
    PipesStopped { failed: usize },
}

impl RuntimeError {
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn missing_shared(
        category: Category,
        plugin: impl Into<String>,
        resource: &'static str,
    ) -> Self {
        Self::MissingShared {
            category,
            plugin: plugin.into(),
            resource,
        }
    }
}
