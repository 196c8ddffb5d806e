//! Module runtime - boot, run and stop every pipe of one process
//!
//! Startup order: telemetry → shared plugins → pipes (each in dependency
//! order) → server listeners and client probes → pipe tasks. Cancelling the
//! root token stops everything; each group of tasks then gets
//! `shutdown_timeout` to finish before it is abandoned.

use std::sync::Arc;
use std::time::Duration;

use satellite_config::{Config, PluginConfig, TelemetryConfig};
use satellite_metrics::{MetricsRegistry, MetricsReporter, MetricsSink};
use satellite_pipeline::Pipe;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::assemble::PipeBuilder;
use crate::error::{Result, RuntimeError};
use crate::registry::{BuildContext, PluginRegistry};
use crate::sharing::SharingManager;

/// Default bound on every shutdown wait
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Runtime {
    config: Config,
    registry: PluginRegistry,
    metrics: Arc<MetricsRegistry>,
    shutdown_timeout: Duration,
}

impl Runtime {
    /// Runtime over the built-in plugins
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::with_registry(config, PluginRegistry::builtin()?))
    }

    pub fn with_registry(config: Config, registry: PluginRegistry) -> Self {
        let metrics = Arc::new(MetricsRegistry::new(&config.telemetry));
        Self {
            config,
            registry,
            metrics,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Run until `cancel` fires or every pipe has stopped
    ///
    /// # Errors
    /// Startup failures (unknown plugin, bad plugin config, bind error) are
    /// returned before anything runs. `PipesStopped` is returned when every
    /// pipe ends on its own before cancellation.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let sink = self.telemetry_sink()?;
        let reporter_cancel = CancellationToken::new();
        let reporter = MetricsReporter::builder()
            .registry(Arc::clone(&self.metrics))
            .sink(sink)
            .interval(self.config.telemetry.interval)
            .build()?;

        let sharing = SharingManager::build(&self.config.sharing, &self.registry, &self.metrics)?;
        let builder = PipeBuilder::new(&self.registry, &sharing, &self.metrics);
        let pipes = self
            .config
            .pipes
            .iter()
            .map(|pipe| builder.build(pipe))
            .collect::<Result<Vec<Pipe>>>()?;
        sharing.prepare().await?;

        let reporter_task = tokio::spawn(reporter.run(reporter_cancel.clone()));
        let shared_cancel = CancellationToken::new();
        let shared_tasks = sharing.start(&shared_cancel);

        let mut running = JoinSet::new();
        for pipe in pipes {
            let name = pipe.name().to_string();
            let cancel = cancel.child_token();
            running.spawn(async move { (name, pipe.run(cancel).await) });
        }
        info!(pipes = running.len(), "satellite running");

        let failed = supervise(&mut running, &cancel).await;
        let stopped_early = !cancel.is_cancelled();
        cancel.cancel();

        info!("waiting for pipes to drain...");
        self.drain_pipes(running).await;

        // shared plugins outlive the pipes so senders can flush over the clients
        shared_cancel.cancel();
        info!("stopping shared plugins...");
        for task in shared_tasks {
            self.await_task(&task.name, task.handle).await;
        }

        reporter_cancel.cancel();
        self.await_task("metrics-reporter", reporter_task).await;

        if stopped_early {
            return Err(RuntimeError::PipesStopped { failed });
        }
        info!("satellite stopped");
        Ok(())
    }

    fn telemetry_sink(&self) -> Result<Arc<dyn MetricsSink>> {
        let config = telemetry_plugin(&self.config.telemetry)?;
        let ctx = BuildContext::new("telemetry", &self.metrics);
        self.registry.sinks.create(&config, &ctx)
    }

    async fn drain_pipes(&self, mut running: JoinSet<(String, satellite_pipeline::Result<()>)>) {
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while let Some(joined) = running.join_next().await {
                log_pipe_exit(joined);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = running.len(),
                timeout_secs = self.shutdown_timeout.as_secs(),
                "pipes did not finish within shutdown timeout"
            );
            running.abort_all();
        }
    }

    async fn await_task(&self, name: &str, task: JoinHandle<()>) {
        match tokio::time::timeout(self.shutdown_timeout, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = name, error = %e, "task panicked during shutdown"),
            Err(_) => warn!(task = name, "task did not finish within shutdown timeout"),
        }
    }
}

/// Wait for cancellation or for every pipe to end; returns the failure count
async fn supervise(
    running: &mut JoinSet<(String, satellite_pipeline::Result<()>)>,
    cancel: &CancellationToken,
) -> usize {
    let mut failed = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return failed,
            joined = running.join_next() => match joined {
                None => {
                    error!(failed, "every pipe has stopped");
                    return failed;
                }
                Some(joined) => {
                    if !log_pipe_exit(joined) {
                        failed += 1;
                    }
                }
            },
        }
    }
}

/// Log how a pipe task ended; false when it failed
fn log_pipe_exit(
    joined: std::result::Result<(String, satellite_pipeline::Result<()>), tokio::task::JoinError>,
) -> bool {
    match joined {
        Ok((pipe, Ok(()))) => {
            info!(pipe = %pipe, "pipe stopped");
            true
        }
        Ok((pipe, Err(e))) => {
            error!(pipe = %pipe, error = %e, "pipe failed, other pipes keep running");
            false
        }
        Err(e) => {
            error!(error = %e, "pipe task panicked");
            false
        }
    }
}

/// Plugin config for the telemetry sink named by `export_type`
fn telemetry_plugin(telemetry: &TelemetryConfig) -> Result<PluginConfig> {
    let export_type = match telemetry.export_type.as_str() {
        "" => "none",
        other => other,
    };
    let mut config: PluginConfig = serde_yaml::from_value(serde_yaml::to_value(telemetry)?)?;
    config.set(satellite_config::PLUGIN_NAME_KEY, export_type);
    Ok(config)
}
