//! Configuration validation
//!
//! Validates config consistency:
//! - At least one pipe, with unique non-empty names
//! - Shared clients and servers have unique plugin names
//! - Pipe references to shared plugins resolve
//! - Every gatherer has exactly one of receiver / fetcher
//! - Sender buffer sizes are positive

use std::collections::HashSet;

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let clients = shared_names(&config.sharing.clients, "client")?;
    let servers = shared_names(&config.sharing.servers, "server")?;
    validate_pipes(config, &clients, &servers)
}

fn shared_names<'a>(
    plugins: &'a [crate::PluginConfig],
    component: &'static str,
) -> Result<HashSet<&'a str>> {
    let mut names = HashSet::new();
    for (i, plugin) in plugins.iter().enumerate() {
        let name = plugin.require_plugin_name(component, &format!("#{i}"))?;
        if !names.insert(name) {
            return Err(ConfigError::duplicate(component, name));
        }
    }
    Ok(names)
}

fn validate_pipes(
    config: &Config,
    clients: &HashSet<&str>,
    servers: &HashSet<&str>,
) -> Result<()> {
    if config.pipes.is_empty() {
        return Err(ConfigError::NoPipes);
    }

    let mut seen = HashSet::new();
    for (i, pipe) in config.pipes.iter().enumerate() {
        let name = pipe.name();
        if name.is_empty() {
            return Err(ConfigError::missing_field(
                "pipe",
                format!("#{i}"),
                "common_config.pipe_name",
            ));
        }
        if !seen.insert(name) {
            return Err(ConfigError::duplicate("pipe", name));
        }

        let gatherer = pipe
            .gatherer
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("pipe", name, "gatherer"))?;
        match (&gatherer.receiver, &gatherer.fetcher) {
            (Some(r), None) => {
                r.require_plugin_name("receiver", name)?;
                let server = gatherer
                    .server_name
                    .as_deref()
                    .ok_or_else(|| ConfigError::missing_field("pipe", name, "server_name"))?;
                if !servers.contains(server) {
                    return Err(ConfigError::unknown_reference(name, "server", server));
                }
            }
            (None, Some(f)) => {
                f.require_plugin_name("fetcher", name)?;
                if gatherer.fetch_interval.is_zero() {
                    return Err(ConfigError::invalid_value(
                        "pipe",
                        name,
                        "fetch_interval",
                        "must be greater than zero",
                    ));
                }
            }
            _ => {
                return Err(ConfigError::invalid_value(
                    "pipe",
                    name,
                    "gatherer",
                    "exactly one of receiver or fetcher is required",
                ));
            }
        }
        if let Some(queue) = &gatherer.queue {
            queue.require_plugin_name("queue", name)?;
        }

        if let Some(processor) = &pipe.processor {
            for filter in &processor.filters {
                filter.require_plugin_name("filter", name)?;
            }
        }

        let sender = pipe
            .sender
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("pipe", name, "sender"))?;
        if let Some(client) = sender.client_name.as_deref()
            && !clients.contains(client)
        {
            return Err(ConfigError::unknown_reference(name, "client", client));
        }
        if sender.max_buffer_size == 0 {
            return Err(ConfigError::invalid_value(
                "pipe",
                name,
                "max_buffer_size",
                "must be greater than zero",
            ));
        }
        if sender.input_buffer == 0 {
            return Err(ConfigError::invalid_value(
                "pipe",
                name,
                "input_buffer",
                "must be greater than zero",
            ));
        }
        for forwarder in &sender.forwarders {
            forwarder.require_plugin_name("forwarder", name)?;
        }
        if let Some(fallbacker) = &sender.fallbacker {
            fallbacker.require_plugin_name("fallbacker", name)?;
        }
    }
    Ok(())
}
