//! Ingress admission control
//!
//! Every accepted connection is checked against two live signals: the
//! process CPU utilisation (sampled in the background) and the number of
//! connections currently open. A [`ConnectionGuard`] holds one slot and
//! gives it back exactly once when dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use satellite_metrics::{Counter, Gauge, MetricsRegistry};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a connection was turned away
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    Cpu { utilization: f64, limit: f64 },
    Connections { active: usize, limit: usize },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu { utilization, limit } => {
                write!(f, "cpu utilization {utilization:.1}% over limit {limit:.1}%")
            }
            Self::Connections { active, limit } => {
                write!(f, "{active} connections at limit {limit}")
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct AdmissionMetrics {
    pub accepted: Arc<Counter>,
    pub rejected_cpu: Arc<Counter>,
    pub rejected_connections: Arc<Counter>,
    pub active: Arc<Gauge>,
}

impl AdmissionMetrics {
    pub fn registered(registry: &MetricsRegistry, server: &str) -> Self {
        let labels = [("server", server)];
        Self {
            accepted: registry.counter("server_connections_accepted", &labels),
            rejected_cpu: registry.counter("server_rejected_cpu", &labels),
            rejected_connections: registry.counter("server_rejected_connections", &labels),
            active: registry.gauge("server_connections_active", &labels),
        }
    }
}

/// CPU and connection-count gate
pub struct Admission {
    max_connections: usize,
    max_cpu: f64,
    active: AtomicUsize,
    // f64 bits of the last CPU sample
    cpu: AtomicU64,
    metrics: AdmissionMetrics,
}

impl Admission {
    /// `0` disables either limit
    pub fn new(max_connections: usize, max_cpu: f64, metrics: AdmissionMetrics) -> Arc<Self> {
        Arc::new(Self {
            max_connections,
            max_cpu,
            active: AtomicUsize::new(0),
            cpu: AtomicU64::new(0f64.to_bits()),
            metrics,
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Last sampled CPU utilisation, percent of the whole machine
    pub fn cpu_utilization(&self) -> f64 {
        f64::from_bits(self.cpu.load(Ordering::Relaxed))
    }

    pub fn record_cpu(&self, utilization: f64) {
        self.cpu.store(utilization.to_bits(), Ordering::Relaxed);
    }

    /// Take a connection slot or say why not
    pub fn try_admit(self: &Arc<Self>) -> Result<ConnectionGuard, Rejection> {
        if self.max_cpu > 0.0 {
            let utilization = self.cpu_utilization();
            if utilization > self.max_cpu {
                self.metrics.rejected_cpu.inc();
                return Err(Rejection::Cpu {
                    utilization,
                    limit: self.max_cpu,
                });
            }
        }

        let limit = self.max_connections;
        let taken = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (limit == 0 || n < limit).then_some(n + 1)
            });
        match taken {
            Ok(_) => {
                self.metrics.accepted.inc();
                self.metrics.active.inc();
                Ok(ConnectionGuard {
                    admission: Arc::clone(self),
                })
            }
            Err(active) => {
                self.metrics.rejected_connections.inc();
                Err(Rejection::Connections { active, limit })
            }
        }
    }

    /// Sample process CPU every `period` until cancelled
    pub fn spawn_cpu_sampler(self: &Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let admission = Arc::clone(self);
        tokio::spawn(async move {
            let mut sampler = CpuSampler::new();
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let utilization = sampler.sample();
                        admission.record_cpu(utilization);
                        debug!(cpu = utilization, "sampled process cpu");
                    }
                }
            }
        })
    }
}

/// Holds one admitted connection slot
pub struct ConnectionGuard {
    admission: Arc<Admission>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.admission.active.fetch_sub(1, Ordering::AcqRel);
        self.admission.metrics.active.dec();
    }
}

/// Process CPU via sysinfo, normalised to 0..100 across all cores
struct CpuSampler {
    system: System,
    pid: Pid,
    cpus: f64,
}

impl CpuSampler {
    fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get() as f64)
            .unwrap_or(1.0);
        Self { system, pid, cpus }
    }

    fn sample(&mut self) -> f64 {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.system
            .process(self.pid)
            .map_or(0.0, |p| f64::from(p.cpu_usage()) / self.cpus)
    }
}
