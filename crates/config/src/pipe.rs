//! Pipe and sharing sections
//!
//! A pipe is one Gatherer → Queue → Processor → Sender chain. The sharing
//! section declares clients and servers instantiated once per process and
//! referenced from pipes by plugin name.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::PluginConfig;

/// Name-only section every pipe carries
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CommonConfig {
    /// Pipe name, used in logs, metric labels and queue directories
    pub pipe_name: String,
}

/// Shared clients and servers
///
/// ```yaml
/// sharing:
///   common_config:
///     pipe_name: sharing
///   clients:
///     - plugin_name: native-client
///       server_addr: 127.0.0.1:11800
///   servers:
///     - plugin_name: native-server
///       address: 0.0.0.0:11800
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SharingConfig {
    pub common_config: CommonConfig,
    pub clients: Vec<PluginConfig>,
    pub servers: Vec<PluginConfig>,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            common_config: CommonConfig {
                pipe_name: "sharing".into(),
            },
            clients: Vec::new(),
            servers: Vec::new(),
        }
    }
}

/// One pipe
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PipeConfig {
    pub common_config: CommonConfig,
    pub gatherer: Option<GathererConfig>,
    pub processor: Option<ProcessorConfig>,
    pub sender: Option<SenderConfig>,
}

impl PipeConfig {
    /// Pipe name
    pub fn name(&self) -> &str {
        &self.common_config.pipe_name
    }
}

/// Gatherer module: exactly one of `receiver` / `fetcher`, plus a queue
///
/// ```yaml
/// gatherer:
///   server_name: native-server
///   receiver:
///     plugin_name: native-receiver
///   queue:
///     plugin_name: mmap-queue
///     partition: 2
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GathererConfig {
    /// Shared server the receiver registers against
    pub server_name: Option<String>,

    /// Push-mode plugin
    pub receiver: Option<PluginConfig>,

    /// Pull-mode plugin
    pub fetcher: Option<PluginConfig>,

    /// Queue plugin (defaults to `memory-queue`)
    pub queue: Option<PluginConfig>,

    /// Fetch period for pull mode
    /// Default: 10s
    #[serde(with = "crate::duration")]
    pub fetch_interval: Duration,

    /// Capacity of each partition's output channel towards the processor
    /// Default: 1000
    pub output_buffer: usize,
}

impl Default for GathererConfig {
    fn default() -> Self {
        Self {
            server_name: None,
            receiver: None,
            fetcher: None,
            queue: None,
            fetch_interval: Duration::from_secs(10),
            output_buffer: 1000,
        }
    }
}

/// Processor module
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Filter chain, applied in order
    pub filters: Vec<PluginConfig>,
}

/// Sender module
///
/// ```yaml
/// sender:
///   client_name: native-client
///   max_buffer_size: 200
///   min_flush_events: 1
///   flush_time: 1000
///   forwarders:
///     - plugin_name: native-forwarder
///       forward_type: segment
///   fallbacker:
///     plugin_name: timer-fallbacker
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SenderConfig {
    /// Shared client the forwarders write to
    pub client_name: Option<String>,

    /// Forwarders, one per event type
    pub forwarders: Vec<PluginConfig>,

    /// Retry policy (defaults to `none-fallbacker`)
    pub fallbacker: Option<PluginConfig>,

    /// Contexts per batch before an immediate flush
    /// Default: 200
    pub max_buffer_size: usize,

    /// Minimum contexts for a timer-driven flush
    /// Default: 1
    pub min_flush_events: usize,

    /// Timer flush period
    /// Default: 1s
    #[serde(with = "crate::duration")]
    pub flush_time: Duration,

    /// Capacity of each partition's input channel
    /// Default: 1000
    pub input_buffer: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            client_name: None,
            forwarders: Vec::new(),
            fallbacker: None,
            max_buffer_size: 200,
            min_flush_events: 1,
            flush_time: Duration::from_secs(1),
            input_buffer: 1000,
        }
    }
}
