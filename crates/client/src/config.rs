//! Native client configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, Result};

/// Configuration for the `native-client` sharing plugin
///
/// ```yaml
/// clients:
///   - plugin_name: native-client
///     server_addr: 10.0.0.1:11800,10.0.0.2:11800
///     check_period: 5
///     ca_pem_path: ""
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NativeClientConfig {
    /// Comma-separated upstream addresses (static resolver)
    pub server_addr: String,

    /// Cluster discovery; replaces `server_addr` when set
    pub discovery: Option<DiscoveryConfig>,

    /// Period of the connectivity probe, in seconds
    /// Default: 5
    pub check_period: u64,

    /// TCP connect timeout
    /// Default: 5s
    #[serde(with = "satellite_config::duration")]
    pub connect_timeout: Duration,

    /// Deadline for one request/response exchange
    /// Default: 20s
    #[serde(with = "satellite_config::duration")]
    pub request_timeout: Duration,

    /// Idle connections kept per upstream address; concurrent calls beyond
    /// this still get their own connection, closed after use
    /// Default: 8
    pub max_idle_connections: usize,

    /// TCP keep-alive enabled
    /// Default: true
    pub tcp_keepalive: bool,

    /// TCP keep-alive time
    /// Default: 30s
    #[serde(with = "satellite_config::duration")]
    pub tcp_keepalive_interval: Duration,

    /// CA certificate; empty disables TLS
    pub ca_pem_path: PathBuf,

    /// Client certificate for mutual TLS
    pub client_pem_path: PathBuf,

    /// Client private key for mutual TLS
    pub client_key_path: PathBuf,

    /// Name checked against the server certificate; defaults to the host part
    /// of each address
    pub tls_server_name: Option<String>,
}

impl Default for NativeClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:11800".into(),
            discovery: None,
            check_period: 5,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(20),
            max_idle_connections: 8,
            tcp_keepalive: true,
            tcp_keepalive_interval: Duration::from_secs(30),
            ca_pem_path: PathBuf::new(),
            client_pem_path: PathBuf::new(),
            client_key_path: PathBuf::new(),
            tls_server_name: None,
        }
    }
}

impl NativeClientConfig {
    /// Client pointed at a static address list
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_check_period(mut self, secs: u64) -> Self {
        self.check_period = secs;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tls(
        mut self,
        ca: impl Into<PathBuf>,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.ca_pem_path = ca.into();
        self.client_pem_path = cert.into();
        self.client_key_path = key.into();
        self
    }

    pub fn check_period(&self) -> Duration {
        Duration::from_secs(self.check_period.max(1))
    }

    /// TLS is on when any of the three paths is set
    pub fn tls_enabled(&self) -> bool {
        [&self.ca_pem_path, &self.client_pem_path, &self.client_key_path]
            .iter()
            .any(|p| !p.as_os_str().is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery.is_none() && self.server_addr.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "server_addr is required without discovery".into(),
            ));
        }
        if let Some(discovery) = &self.discovery {
            discovery.validate()?;
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ClientError::InvalidConfig("timeouts must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Resource kind a discoverer watches
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pod,
    #[default]
    Service,
    Endpoints,
}

/// Cluster discovery settings
///
/// The built-in discoverer resolves `<service>.<namespace>.svc.<cluster_domain>`
/// for every namespace on each refresh.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub kind: ResourceKind,

    /// Service (or headless service) name to resolve
    pub service: String,

    /// Namespaces to search
    /// Default: ["default"]
    pub namespaces: Vec<String>,

    /// Label selector, kept for discoverers that filter by labels
    pub label_selector: String,

    /// Field selector, kept for discoverers that filter by fields
    pub field_selector: String,

    /// Port appended to every discovered address
    pub port: u16,

    /// Default: cluster.local
    pub cluster_domain: String,

    /// Default: 30s
    #[serde(with = "satellite_config::duration")]
    pub refresh_period: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            kind: ResourceKind::Service,
            service: String::new(),
            namespaces: vec!["default".into()],
            label_selector: String::new(),
            field_selector: String::new(),
            port: 11800,
            cluster_domain: "cluster.local".into(),
            refresh_period: Duration::from_secs(30),
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.service.is_empty() {
            return Err(ClientError::InvalidConfig("discovery.service is required".into()));
        }
        if self.namespaces.is_empty() {
            return Err(ClientError::InvalidConfig(
                "discovery.namespaces must not be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(ClientError::InvalidConfig("discovery.port must be set".into()));
        }
        Ok(())
    }

    /// DNS names to resolve, one per namespace
    pub fn hostnames(&self) -> Vec<String> {
        self.namespaces
            .iter()
            .map(|ns| format!("{}.{}.svc.{}", self.service, ns, self.cluster_domain))
            .collect()
    }
}
