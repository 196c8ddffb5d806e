//! Start command - run every configured pipe until a shutdown signal

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use satellite_config::Config;
use satellite_runtime::Runtime;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::init_logging;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        env = "SATELLITE_CONFIG",
        default_value = "configs/satellite_config.yaml"
    )]
    pub config: PathBuf,

    /// Seconds every task gets to finish after a shutdown signal
    #[arg(
        short = 't',
        long = "shutdown_hook_time",
        env = "SATELLITE_SHUTDOWN_HOOK_TIME",
        default_value_t = 5
    )]
    pub shutdown_hook_time: u64,
}

pub async fn run(args: StartArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    init_logging(&config.logger)?;

    info!(
        config = %args.config.display(),
        pipes = config.pipes.len(),
        version = env!("CARGO_PKG_VERSION"),
        "starting satellite"
    );

    let runtime = Runtime::new(config)
        .context("failed to register plugins")?
        .with_shutdown_timeout(Duration::from_secs(args.shutdown_hook_time));

    let signals = Signals::install().context("failed to install signal handlers")?;
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let name = signals.recv().await;
            info!(signal = name, "shutdown signal received, stopping satellite...");
            cancel.cancel();
        })
    };

    let result = runtime.run(cancel).await;
    watcher.abort();
    if let Err(e) = &result {
        error!(error = %e, "satellite stopped with error");
    }
    result.context("satellite stopped with error")?;

    info!("satellite shutdown complete");
    Ok(())
}

/// SIGINT, SIGTERM and SIGHUP all request shutdown
struct Signals {
    #[cfg(unix)]
    terminate: signal::unix::Signal,
    #[cfg(unix)]
    hangup: signal::unix::Signal,
}

impl Signals {
    fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};
            Ok(Self {
                terminate: signal(SignalKind::terminate())?,
                hangup: signal(SignalKind::hangup())?,
            })
        }
        #[cfg(not(unix))]
        Ok(Self {})
    }

    /// Wait for the first shutdown signal; returns its name
    async fn recv(mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                result = signal::ctrl_c() => ctrl_c_name(result),
                _ = self.terminate.recv() => "SIGTERM",
                _ = self.hangup.recv() => "SIGHUP",
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c_name(signal::ctrl_c().await)
        }
    }
}

fn ctrl_c_name(result: std::io::Result<()>) -> &'static str {
    match result {
        Ok(()) => "SIGINT",
        Err(e) => {
            error!(error = %e, "failed to listen for interrupt");
            "interrupt-error"
        }
    }
}
