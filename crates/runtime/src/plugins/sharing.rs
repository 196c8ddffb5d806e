//! Sharing plugins: one instance per process, referenced by name from pipes

use std::sync::Arc;

use satellite_client::{ClientMetrics, NativeClientConfig, SharedClient};
use satellite_config::PluginConfig;
use satellite_server::{NativeServer, NativeServerConfig};

use super::typed;
use crate::error::Result;
use crate::registry::{BuildContext, Category, PluginFactory};

pub struct NativeClientFactory;

impl PluginFactory<Arc<SharedClient>> for NativeClientFactory {
    fn name(&self) -> &'static str {
        "native-client"
    }

    fn description(&self) -> &'static str {
        "Framed TCP client to the upstream backends. Balances calls over a static \
         address list or a DNS-discovered set, probes connectivity every check_period \
         and publishes connected/disconnect status to every sender using it. \
         Mutual TLS is enabled by setting the three PEM paths."
    }

    fn default_config(&self) -> &'static str {
        r#"
# Comma-separated upstream addresses
server_addr: 127.0.0.1:11800
# Connectivity probe period in seconds
check_period: 5
connect_timeout: 5s
request_timeout: 20s
# Idle connections kept per upstream address
max_idle_connections: 8
tcp_keepalive: true
tcp_keepalive_interval: 30s
# Empty paths disable TLS
ca_pem_path: ""
client_pem_path: ""
client_key_path: ""
"#
    }

    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<Arc<SharedClient>> {
        let cfg: NativeClientConfig = typed(Category::Client, self.name(), config)?;
        let client = SharedClient::new(self.name(), cfg)?
            .with_metrics(ClientMetrics::registered(ctx.metrics, self.name()));
        Ok(Arc::new(client))
    }
}

pub struct NativeServerFactory;

impl PluginFactory<Arc<NativeServer>> for NativeServerFactory {
    fn name(&self) -> &'static str {
        "native-server"
    }

    fn description(&self) -> &'static str {
        "Framed TCP ingress server. Receivers claim event types on it; every accepted \
         connection is admitted only while process CPU and the active connection count \
         stay under their ceilings."
    }

    fn default_config(&self) -> &'static str {
        r#"
address: 0.0.0.0:11800
# 0 disables the connection ceiling
max_connections: 5000
# Percent of the whole machine; 0 disables the CPU ceiling
max_cpu_utilization: 75
cpu_sample_period: 5s
read_buffer_size: 65536
nodelay: true
keepalive: true
"#
    }

    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<Arc<NativeServer>> {
        let cfg: NativeServerConfig = typed(Category::Server, self.name(), config)?;
        let server = NativeServer::with_registry(self.name(), cfg, Some(ctx.metrics.as_ref()))?;
        Ok(Arc::new(server))
    }
}
