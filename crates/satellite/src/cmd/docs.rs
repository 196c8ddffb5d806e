//! Docs command - render plugin documentation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use satellite_runtime::{DocsOptions, PluginRegistry, docs};

#[derive(Args, Debug)]
pub struct DocsArgs {
    /// Output directory
    #[arg(short, long, default_value = "docs")]
    pub output: PathBuf,

    /// Menu file, relative to the output directory
    #[arg(short, long, default_value = "menu.yml")]
    pub menu: String,

    /// Plugin pages directory, relative to the output directory
    #[arg(short, long, default_value = "plugins")]
    pub plugins: String,
}

pub fn run(args: DocsArgs) -> Result<()> {
    let registry = PluginRegistry::builtin().context("failed to register plugins")?;
    let options = DocsOptions {
        output: args.output,
        menu: args.menu,
        plugins: args.plugins,
    };
    docs::generate(&registry, &options)
        .with_context(|| format!("failed to write docs to {}", options.output.display()))?;
    Ok(())
}
