//! Client-side load balancing
//!
//! The picker policy, in order:
//!
//! 1. a single backend is always picked
//! 2. a pinned address in the call context wins if it is still usable
//! 3. a routing key hashes (IEEE CRC-32) onto the usable set and is pinned
//! 4. otherwise round-robin over the usable set

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::info;

use crate::error::{ClientError, Result};
use crate::subchannel::{Dialer, Subchannel};

/// Per-call routing hints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    /// Hash-stable key for related calls
    pub routing_key: Option<String>,

    /// Address chosen for an earlier call with the same key
    pub pinned: Option<String>,
}

impl CallContext {
    pub fn with_routing_key(key: impl Into<String>) -> Self {
        Self {
            routing_key: Some(key.into()),
            pinned: None,
        }
    }
}

/// Address set plus picker
pub struct Balancer {
    subchannels: RwLock<Vec<Arc<Subchannel>>>,
    next: AtomicUsize,
    dialer: Dialer,
}

impl Balancer {
    pub(crate) fn new(dialer: Dialer) -> Self {
        Self {
            subchannels: RwLock::new(Vec::new()),
            next: AtomicUsize::new(0),
            dialer,
        }
    }

    /// Replace the address set, keeping subchannels for addresses that stay
    ///
    /// Returns the subchannels that were removed so the caller can shut
    /// them down.
    pub fn update(&self, addrs: &[String]) -> Vec<Arc<Subchannel>> {
        let mut current = self.subchannels.write();
        let mut next = Vec::with_capacity(addrs.len());
        for addr in addrs {
            if next.iter().any(|s: &Arc<Subchannel>| s.addr() == addr) {
                continue;
            }
            let existing = current.iter().find(|s| s.addr() == addr).cloned();
            next.push(existing.unwrap_or_else(|| Arc::new(Subchannel::new(addr, self.dialer.clone()))));
        }
        let removed: Vec<_> = current
            .iter()
            .filter(|s| !addrs.iter().any(|a| a == s.addr()))
            .cloned()
            .collect();
        if !removed.is_empty() || next.len() != current.len() {
            info!(
                addresses = next.len(),
                removed = removed.len(),
                "upstream address set changed"
            );
        }
        *current = next;
        removed
    }

    pub fn subchannels(&self) -> Vec<Arc<Subchannel>> {
        self.subchannels.read().clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.subchannels.read().iter().map(|s| s.addr().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.subchannels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subchannels.read().is_empty()
    }

    /// Whether any subchannel is currently usable
    pub fn any_usable(&self) -> bool {
        self.subchannels.read().iter().any(|s| s.state().is_usable())
    }

    /// Pick a subchannel for one call, pinning into `ctx` when routed by key
    pub fn pick(&self, ctx: &mut CallContext) -> Result<Arc<Subchannel>> {
        let all = self.subchannels.read();
        match all.len() {
            0 => return Err(ClientError::NoReadyBackend),
            1 => return Ok(Arc::clone(&all[0])),
            _ => {}
        }

        let usable: Vec<&Arc<Subchannel>> = all.iter().filter(|s| s.state().is_usable()).collect();
        if usable.is_empty() {
            return Err(ClientError::NoReadyBackend);
        }

        if let Some(pinned) = ctx.pinned.as_deref()
            && let Some(hit) = usable.iter().find(|s| s.addr() == pinned)
        {
            return Ok(Arc::clone(hit));
        }

        if let Some(key) = ctx.routing_key.as_deref() {
            let index = crc32fast::hash(key.as_bytes()) as usize % usable.len();
            let chosen = Arc::clone(usable[index]);
            ctx.pinned = Some(chosen.addr().to_string());
            return Ok(chosen);
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % usable.len();
        Ok(Arc::clone(usable[index]))
    }
}
