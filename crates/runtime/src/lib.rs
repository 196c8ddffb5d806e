//! Satellite Runtime - plugins, shared resources and process lifecycle
//!
//! Turns a loaded [`satellite_config::Config`] into running pipes:
//!
//! ```text
//! Config ──► PluginRegistry ──► SharingManager (clients, servers)
//!                 │                     │
//!                 ▼                     ▼
//!            PipeBuilder ──► Pipe(queue → sender → processor → gatherer)
//!                                       │
//!                                       ▼
//!                                Runtime::run(cancel)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let config = Config::from_file("configs/satellite_config.yaml")?;
//! let cancel = CancellationToken::new();
//! Runtime::new(config)?
//!     .with_shutdown_timeout(Duration::from_secs(5))
//!     .run(cancel)
//!     .await?;
//! ```

mod assemble;
pub mod docs;
mod error;
pub mod plugins;
mod registry;
mod runner;
mod sharing;

pub use assemble::{DEFAULT_FALLBACKER, DEFAULT_QUEUE, PipeBuilder};
pub use docs::DocsOptions;
pub use error::{Result, RuntimeError};
pub use registry::{
    BuildContext, Category, PluginDoc, PluginFactory, PluginRegistry, TypedRegistry,
};
pub use runner::{DEFAULT_SHUTDOWN_TIMEOUT, Runtime};
pub use sharing::{SharedTask, SharingManager};
