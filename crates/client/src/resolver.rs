//! Upstream address resolution
//!
//! Two schemes: a static comma-separated list, and a [`Discoverer`] polled on
//! a period whose changed results are pushed into the balancer.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::balancer::Balancer;
use crate::config::DiscoveryConfig;
use crate::error::{ClientError, Result};

/// Parse a static `host:port[,host:port...]` list
pub fn parse_static(list: &str) -> Result<Vec<String>> {
    let addrs: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    if addrs.is_empty() {
        return Err(ClientError::InvalidConfig("server_addr has no addresses".into()));
    }
    if let Some(bad) = addrs.iter().find(|a| !a.contains(':')) {
        return Err(ClientError::InvalidConfig(format!(
            "address {bad} is missing a port"
        )));
    }
    Ok(addrs)
}

/// Source of a live upstream address set
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Current addresses as `host:port`
    async fn discover(&self) -> Result<Vec<String>>;
}

/// Resolves headless-service DNS names to pod addresses
pub struct DnsDiscoverer {
    hostnames: Vec<String>,
    port: u16,
}

impl DnsDiscoverer {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            hostnames: config.hostnames(),
            port: config.port,
        }
    }
}

#[async_trait]
impl Discoverer for DnsDiscoverer {
    async fn discover(&self) -> Result<Vec<String>> {
        let mut found = BTreeSet::new();
        let mut last_err = None;
        for host in &self.hostnames {
            match tokio::net::lookup_host((host.as_str(), self.port)).await {
                Ok(addrs) => found.extend(addrs.map(|a| a.to_string())),
                Err(e) => {
                    debug!(host = %host, error = %e, "dns lookup failed");
                    last_err = Some(ClientError::Discovery(format!("{host}: {e}")));
                }
            }
        }
        match (found.is_empty(), last_err) {
            (true, Some(e)) => Err(e),
            _ => Ok(found.into_iter().collect()),
        }
    }
}

/// Poll `discoverer` every `period` and push changed address sets
///
/// Errors and empty results are logged and leave the current set in place.
pub async fn watch(
    discoverer: Arc<dyn Discoverer>,
    balancer: Arc<Balancer>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut current: Vec<String> = balancer.addresses();
    current.sort();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match discoverer.discover().await {
            Ok(mut addrs) if !addrs.is_empty() => {
                addrs.sort();
                addrs.dedup();
                if addrs != current {
                    for gone in balancer.update(&addrs) {
                        gone.shutdown().await;
                    }
                    current = addrs;
                }
            }
            Ok(_) => warn!("discovery returned no addresses, keeping previous set"),
            Err(e) => warn!(error = %e, "discovery failed, retrying next period"),
        }
    }
    debug!("discovery watch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_static() {
        let addrs = parse_static(" a:1, b:2 ,,c:3").unwrap();
        assert_eq!(addrs, ["a:1", "b:2", "c:3"]);
    }

    #[test]
    fn test_parse_static_rejects_empty_and_portless() {
        assert!(parse_static(" , ").is_err());
        assert!(parse_static("a:1,b").is_err());
    }

    #[test]
    fn test_discovery_hostnames() {
        let config = DiscoveryConfig {
            service: "oap".into(),
            namespaces: vec!["obs".into(), "default".into()],
            ..DiscoveryConfig::default()
        };
        assert_eq!(
            config.hostnames(),
            ["oap.obs.svc.cluster.local", "oap.default.svc.cluster.local"]
        );
    }

    #[tokio::test]
    async fn test_dns_discoverer_resolves_localhost() {
        let discoverer = DnsDiscoverer {
            hostnames: vec!["localhost".into()],
            port: 11800,
        };
        let addrs = discoverer.discover().await.unwrap();
        assert!(addrs.iter().all(|a| a.ends_with(":11800")));
        assert!(!addrs.is_empty());
    }
}
