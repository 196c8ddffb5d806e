//! Plugin registry - config-driven component creation
//!
//! Every plugin interface is a [`Category`] with its own [`TypedRegistry`].
//! A registry maps plugin names to factories; creating a plugin resolves the
//! name from `plugin_name`, merges the factory's default YAML underneath the
//! user's map and hands the result to the factory.
//!
//! # Example
//!
//! ```ignore
//! let registry = PluginRegistry::builtin();
//! let ctx = BuildContext::new("trace", &metrics);
//! let queue = registry.queues.create(&PluginConfig::named("memory-queue"), &ctx)?;
//! ```
//!
//! Registration happens once at startup; lookups afterwards take `&self`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use satellite_client::SharedClient;
use satellite_config::{ConfigError, PluginConfig};
use satellite_filter::Filter;
use satellite_forwarder::{Fallbacker, Forwarder};
use satellite_metrics::{MetricsRegistry, MetricsSink};
use satellite_pipeline::{Fetcher, NativeReceiver, SyncInvoker};
use satellite_queue::Queue;
use satellite_server::NativeServer;
use serde::Serialize;

use crate::error::{Result, RuntimeError};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Plugin interface a factory produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Client,
    Server,
    Receiver,
    Fetcher,
    Queue,
    Filter,
    Forwarder,
    Fallbacker,
    TelemetrySink,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Client,
        Category::Server,
        Category::Receiver,
        Category::Fetcher,
        Category::Queue,
        Category::Filter,
        Category::Forwarder,
        Category::Fallbacker,
        Category::TelemetrySink,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
            Self::Receiver => "receiver",
            Self::Fetcher => "fetcher",
            Self::Queue => "queue",
            Self::Filter => "filter",
            Self::Forwarder => "forwarder",
            Self::Fallbacker => "fallbacker",
            Self::TelemetrySink => "telemetry",
        }
    }

    /// Heading used in generated docs
    pub const fn title(self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Server => "Server",
            Self::Receiver => "Receiver",
            Self::Fetcher => "Fetcher",
            Self::Queue => "Queue",
            Self::Filter => "Filter",
            Self::Forwarder => "Forwarder",
            Self::Fallbacker => "Fallbacker",
            Self::TelemetrySink => "Telemetry",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state a factory may draw on
///
/// Which fields are set depends on where in the pipe the plugin sits: a
/// receiver gets the queue and the sync path, a forwarder gets the client.
#[derive(Clone)]
pub struct BuildContext<'a> {
    pub pipe: &'a str,
    pub metrics: &'a Arc<MetricsRegistry>,
    pub queue: Option<&'a Arc<Queue>>,
    pub client: Option<&'a Arc<SharedClient>>,
    pub sync: Option<Arc<dyn SyncInvoker>>,
}

impl<'a> BuildContext<'a> {
    pub fn new(pipe: &'a str, metrics: &'a Arc<MetricsRegistry>) -> Self {
        Self {
            pipe,
            metrics,
            queue: None,
            client: None,
            sync: None,
        }
    }

    #[must_use]
    pub fn with_queue(mut self, queue: &'a Arc<Queue>) -> Self {
        self.queue = Some(queue);
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: Option<&'a Arc<SharedClient>>) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_sync(mut self, sync: Arc<dyn SyncInvoker>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn require_queue(&self, category: Category, plugin: &str) -> Result<&'a Arc<Queue>> {
        self.queue
            .ok_or_else(|| RuntimeError::missing_shared(category, plugin, "queue"))
    }

    pub fn require_client(
        &self,
        category: Category,
        plugin: &str,
    ) -> Result<&'a Arc<SharedClient>> {
        self.client
            .ok_or_else(|| RuntimeError::missing_shared(category, plugin, "client"))
    }
}

/// Factory for one plugin of category `T`
///
/// Implement this to make a plugin available by name in configuration.
pub trait PluginFactory<T>: Send + Sync {
    /// Name matched against `plugin_name`
    fn name(&self) -> &'static str;

    /// One-paragraph description for generated docs
    fn description(&self) -> &'static str;

    /// YAML merged underneath the user's config before `create`
    fn default_config(&self) -> &'static str {
        ""
    }

    /// Build the plugin from its merged config
    ///
    /// # Errors
    /// Returns an error when the config does not describe a usable plugin.
    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<T>;
}

/// Catalogue entry for one registered plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDoc {
    pub category: Category,
    pub name: &'static str,
    pub description: &'static str,
    pub default_config: &'static str,
}

/// Factories of one category, keyed by plugin name
pub struct TypedRegistry<T> {
    category: Category,
    factories: BTreeMap<&'static str, Box<dyn PluginFactory<T>>>,
}

impl<T> TypedRegistry<T> {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            factories: BTreeMap::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Register a factory; a second factory with the same name is rejected
    pub fn register<F: PluginFactory<T> + 'static>(&mut self, factory: F) -> Result<()> {
        let name = factory.name();
        if self.factories.contains_key(name) {
            return Err(RuntimeError::DuplicatePlugin {
                category: self.category,
                name,
            });
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Parsed default config of a registered plugin
    pub fn default_config(&self, name: &str) -> Result<PluginConfig> {
        self.defaults_of(self.factory(name)?)
    }

    /// Create a plugin from a user config carrying `plugin_name`
    ///
    /// # Errors
    /// - `Config` if `plugin_name` is missing
    /// - `UnknownPlugin` if no factory has that name
    /// - whatever the factory reports for an unusable config
    pub fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<T> {
        let name = config.require_plugin_name(self.category.as_str(), ctx.pipe)?;
        let factory = self.factory(name)?;
        let merged = config.merged_over(&self.defaults_of(factory)?);
        factory.create(&merged, ctx)
    }

    pub fn docs(&self) -> Vec<PluginDoc> {
        self.factories
            .values()
            .map(|f| PluginDoc {
                category: self.category,
                name: f.name(),
                description: f.description(),
                default_config: f.default_config(),
            })
            .collect()
    }

    fn factory(&self, name: &str) -> Result<&dyn PluginFactory<T>> {
        self.factories
            .get(name)
            .map(|f| f.as_ref())
            .ok_or_else(|| RuntimeError::UnknownPlugin {
                category: self.category,
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    fn defaults_of(&self, factory: &dyn PluginFactory<T>) -> Result<PluginConfig> {
        let mut defaults = PluginConfig::from_yaml(factory.default_config()).map_err(|source| {
            RuntimeError::BadDefaults {
                category: self.category,
                name: factory.name(),
                source,
            }
        })?;
        defaults.set(satellite_config::PLUGIN_NAME_KEY, factory.name());
        Ok(defaults)
    }
}

/// Every plugin category the runtime knows about
pub struct PluginRegistry {
    pub clients: TypedRegistry<Arc<SharedClient>>,
    pub servers: TypedRegistry<Arc<NativeServer>>,
    pub receivers: TypedRegistry<Arc<NativeReceiver>>,
    pub fetchers: TypedRegistry<Arc<dyn Fetcher>>,
    pub queues: TypedRegistry<Arc<Queue>>,
    pub filters: TypedRegistry<Box<dyn Filter>>,
    pub forwarders: TypedRegistry<Arc<dyn Forwarder>>,
    pub fallbackers: TypedRegistry<Arc<dyn Fallbacker>>,
    pub sinks: TypedRegistry<Arc<dyn MetricsSink>>,
}

impl PluginRegistry {
    /// Registry with no plugins at all
    pub fn empty() -> Self {
        Self {
            clients: TypedRegistry::new(Category::Client),
            servers: TypedRegistry::new(Category::Server),
            receivers: TypedRegistry::new(Category::Receiver),
            fetchers: TypedRegistry::new(Category::Fetcher),
            queues: TypedRegistry::new(Category::Queue),
            filters: TypedRegistry::new(Category::Filter),
            forwarders: TypedRegistry::new(Category::Forwarder),
            fallbackers: TypedRegistry::new(Category::Fallbacker),
            sinks: TypedRegistry::new(Category::TelemetrySink),
        }
    }

    /// Registry with every built-in plugin
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty();
        crate::plugins::register_builtin(&mut registry)?;
        Ok(registry)
    }

    /// Docs for every plugin, grouped by category in `Category::ALL` order
    pub fn catalog(&self) -> Vec<(Category, Vec<PluginDoc>)> {
        Category::ALL
            .iter()
            .map(|&category| (category, self.docs(category)))
            .collect()
    }

    pub fn docs(&self, category: Category) -> Vec<PluginDoc> {
        match category {
            Category::Client => self.clients.docs(),
            Category::Server => self.servers.docs(),
            Category::Receiver => self.receivers.docs(),
            Category::Fetcher => self.fetchers.docs(),
            Category::Queue => self.queues.docs(),
            Category::Filter => self.filters.docs(),
            Category::Forwarder => self.forwarders.docs(),
            Category::Fallbacker => self.fallbackers.docs(),
            Category::TelemetrySink => self.sinks.docs(),
        }
    }
}

/// Map a plugin's typed-config error into a config error naming the plugin
pub(crate) fn invalid(
    category: Category,
    plugin: &str,
    message: impl fmt::Display,
) -> RuntimeError {
    ConfigError::invalid_value(category.as_str(), plugin, "config", message.to_string()).into()
}
