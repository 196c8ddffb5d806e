//! Satellite - observability data collector and forwarder
//!
//! # Usage
//!
//! ```bash
//! # Run every configured pipe
//! satellite start
//! satellite start --config configs/satellite_config.yaml --shutdown_hook_time 10
//!
//! # Generate plugin documentation
//! satellite docs --output docs --menu menu.yml --plugins plugins
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use satellite_config::{LogFormat, LoggerConfig};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Satellite - observability data collector and forwarder
#[derive(Parser, Debug)]
#[command(name = "satellite")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start every configured pipe
    Start(cmd::start::StartArgs),

    /// Generate plugin documentation
    Docs(cmd::docs::DocsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start(args) => cmd::start::run(args).await,
        Command::Docs(args) => {
            init_logging(&LoggerConfig::default())?;
            cmd::docs::run(args)
        }
    }
}

/// Build the level filter: `RUST_LOG` when set, else the configured level
fn level_filter(config: &LoggerConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.as_str()))
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))
}

/// Initialize the tracing subscriber for logging
fn init_logging(config: &LoggerConfig) -> Result<()> {
    let filter = level_filter(config)?;
    let timer = ChronoLocal::new(config.time_pattern.clone());

    let layer = match config.log_pattern {
        LogFormat::Console => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_timer(timer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_timer(timer)
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).with(filter).init();
    Ok(())
}
