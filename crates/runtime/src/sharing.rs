//! Sharing manager - process-wide clients and servers
//!
//! Shared plugins are built before any pipe, looked up by plugin name while
//! pipes are assembled, and started only after every receiver has claimed
//! its event types.

use std::collections::BTreeMap;
use std::sync::Arc;

use satellite_client::SharedClient;
use satellite_config::{ConfigError, SharingConfig};
use satellite_metrics::MetricsRegistry;
use satellite_server::NativeServer;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;
use crate::registry::{BuildContext, PluginRegistry};

/// A named long-running shared task
pub struct SharedTask {
    pub name: String,
    pub handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct SharingManager {
    clients: BTreeMap<String, Arc<SharedClient>>,
    servers: BTreeMap<String, Arc<NativeServer>>,
}

impl SharingManager {
    /// Build every configured client and server
    pub fn build(
        config: &SharingConfig,
        registry: &PluginRegistry,
        metrics: &Arc<MetricsRegistry>,
    ) -> Result<Self> {
        let ctx = BuildContext::new(&config.common_config.pipe_name, metrics);
        let mut manager = Self::default();

        for plugin in &config.clients {
            let client = registry.clients.create(plugin, &ctx)?;
            let name = client.name().to_string();
            if manager.clients.insert(name.clone(), client).is_some() {
                return Err(ConfigError::duplicate("client", name).into());
            }
        }
        for plugin in &config.servers {
            let server = registry.servers.create(plugin, &ctx)?;
            let name = server.name().to_string();
            if manager.servers.insert(name.clone(), server).is_some() {
                return Err(ConfigError::duplicate("server", name).into());
            }
        }

        info!(
            clients = manager.clients.len(),
            servers = manager.servers.len(),
            "shared plugins built"
        );
        Ok(manager)
    }

    pub fn client(&self, name: &str) -> Option<&Arc<SharedClient>> {
        self.clients.get(name)
    }

    pub fn server(&self, name: &str) -> Option<&Arc<NativeServer>> {
        self.servers.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty() && self.servers.is_empty()
    }

    /// Bind every server's listener
    pub async fn prepare(&self) -> Result<()> {
        for server in self.servers.values() {
            server.bind().await?;
        }
        Ok(())
    }

    /// Start client probes and server accept loops
    ///
    /// Servers must be bound by `prepare` first; a server that fails to
    /// serve logs the error and stops without affecting the others.
    pub fn start(&self, cancel: &CancellationToken) -> Vec<SharedTask> {
        let mut tasks = Vec::with_capacity(self.clients.len() + self.servers.len());
        for (name, client) in &self.clients {
            tasks.push(SharedTask {
                name: name.clone(),
                handle: client.start(cancel.child_token()),
            });
        }
        for (name, server) in &self.servers {
            let server = Arc::clone(server);
            let cancel = cancel.child_token();
            let task_name = name.clone();
            tasks.push(SharedTask {
                name: name.clone(),
                handle: tokio::spawn(async move {
                    if let Err(e) = server.serve(cancel).await {
                        error!(server = %task_name, error = %e, "server stopped with error");
                    }
                }),
            });
        }
        tasks
    }
}
