//! Satellite Client - Shared upstream connection
//!
//! One [`SharedClient`] per configured client plugin, shared by every pipe
//! that names it. It owns:
//!
//! - the address set (static list or a [`Discoverer`] watch)
//! - a [`Balancer`] picking a subchannel per call
//! - a status channel (`Connected` / `Disconnect`) fed by a periodic probe
//!   and by errors reported from forwarders
//!
//! # Example
//!
//! ```ignore
//! let client = SharedClient::new("native-client", NativeClientConfig::new("127.0.0.1:11800"))?;
//! let task = client.start(cancel.child_token());
//! let mut status = client.subscribe();
//! let reply = client.call(&Frame::data(&events)?, &mut CallContext::default()).await?;
//! ```

mod balancer;
mod config;
mod error;
mod resolver;
mod subchannel;
mod tls;

pub use balancer::{Balancer, CallContext};
pub use config::{DiscoveryConfig, NativeClientConfig, ResourceKind};
pub use error::{ClientError, Result};
pub use resolver::{Discoverer, DnsDiscoverer, parse_static, watch};
pub use subchannel::{ConnectivityState, Subchannel};
pub use tls::load_connector;

use std::fmt;
use std::sync::Arc;

use satellite_metrics::{Counter, MetricsRegistry};
use satellite_protocol::{Frame, StatusCode};
use tokio::sync::watch as status_watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use subchannel::Dialer;

/// Upstream reachability as seen by senders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Connected,
    Disconnect,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Disconnect => f.write_str("disconnect"),
        }
    }
}

/// Counters for one client
#[derive(Clone, Default)]
pub struct ClientMetrics {
    pub calls: Arc<Counter>,
    pub failures: Arc<Counter>,
    pub disconnects: Arc<Counter>,
}

impl ClientMetrics {
    pub fn registered(registry: &MetricsRegistry, client: &str) -> Self {
        let labels = [("client", client)];
        Self {
            calls: registry.counter("client_calls", &labels),
            failures: registry.counter("client_call_failures", &labels),
            disconnects: registry.counter("client_disconnects", &labels),
        }
    }
}

/// Shared handle to the upstream
pub struct SharedClient {
    name: String,
    config: NativeClientConfig,
    balancer: Arc<Balancer>,
    discoverer: Option<Arc<dyn Discoverer>>,
    status: status_watch::Sender<ClientStatus>,
    metrics: ClientMetrics,
}

impl SharedClient {
    /// Validate config, load TLS material and seed the address set
    ///
    /// Nothing is dialed until the first probe or call.
    pub fn new(name: impl Into<String>, config: NativeClientConfig) -> Result<Self> {
        config.validate()?;
        let tls = load_connector(&config)?;
        let balancer = Arc::new(Balancer::new(Dialer::new(&config, tls)));

        let discoverer: Option<Arc<dyn Discoverer>> = match &config.discovery {
            Some(discovery) => Some(Arc::new(DnsDiscoverer::new(discovery))),
            None => {
                balancer.update(&parse_static(&config.server_addr)?);
                None
            }
        };

        let (status, _) = status_watch::channel(ClientStatus::Disconnect);
        Ok(Self {
            name: name.into(),
            config,
            balancer,
            discoverer,
            status,
            metrics: ClientMetrics::default(),
        })
    }

    /// Use a custom discoverer instead of the configured one
    #[must_use]
    pub fn with_discoverer(mut self, discoverer: Arc<dyn Discoverer>) -> Self {
        self.discoverer = Some(discoverer);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: ClientMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balancer(&self) -> &Arc<Balancer> {
        &self.balancer
    }

    /// Current status
    pub fn status(&self) -> ClientStatus {
        *self.status.borrow()
    }

    /// Edge-triggered status updates
    pub fn subscribe(&self) -> status_watch::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    /// Run the probe loop (and the discovery watch, if any) until cancelled
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let watch_task = client.discoverer.clone().map(|d| {
                let period = client
                    .config
                    .discovery
                    .as_ref()
                    .map_or(client.config.check_period(), |c| c.refresh_period);
                tokio::spawn(watch(d, Arc::clone(&client.balancer), period, cancel.clone()))
            });
            client.probe_loop(&cancel).await;
            if let Some(task) = watch_task
                && let Err(e) = task.await
            {
                warn!(client = %client.name, error = %e, "discovery task failed");
            }
            for sub in client.balancer.subchannels() {
                sub.shutdown().await;
            }
            info!(client = %client.name, "client stopped");
        })
    }

    async fn probe_loop(&self, cancel: &CancellationToken) {
        let mut ticker = interval(self.config.check_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            client = %self.name,
            addresses = ?self.balancer.addresses(),
            "client started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.check().await,
            }
        }
    }

    /// Probe every subchannel once and publish the resulting status
    pub async fn check(&self) {
        for sub in self.balancer.subchannels() {
            if sub.state() != ConnectivityState::Shutdown {
                sub.probe().await;
            }
        }
        let next = if self.balancer.any_usable() {
            ClientStatus::Connected
        } else {
            ClientStatus::Disconnect
        };
        self.publish(next);
    }

    /// Send one frame upstream through the balancer
    ///
    /// Failures with a disconnect-class status flip the client to
    /// `Disconnect`.
    pub async fn call(&self, frame: &Frame, ctx: &mut CallContext) -> Result<Frame> {
        self.metrics.calls.inc();
        let result = match self.balancer.pick(ctx) {
            Ok(sub) => sub.call(frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.metrics.failures.inc();
            self.report_error(e.code());
        }
        result
    }

    /// Record an upstream failure class
    pub fn report_error(&self, code: StatusCode) {
        if !code.is_disconnect() {
            return;
        }
        if code.is_auth() {
            warn!(client = %self.name, code = %code, "upstream rejected credentials");
        }
        self.publish(ClientStatus::Disconnect);
    }

    fn publish(&self, next: ClientStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            if next == ClientStatus::Disconnect {
                self.metrics.disconnects.inc();
                warn!(client = %self.name, "upstream status changed to disconnect");
            } else {
                info!(client = %self.name, "upstream status changed to connected");
            }
        } else {
            debug!(client = %self.name, status = %next, "upstream status unchanged");
        }
    }
}

impl fmt::Debug for SharedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedClient")
            .field("name", &self.name)
            .field("addresses", &self.balancer.addresses())
            .field("status", &self.status())
            .finish()
    }
}
