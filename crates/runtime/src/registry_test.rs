use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use satellite_config::{PluginConfig, TelemetryConfig};
use serde::Deserialize;

fn metrics() -> Arc<MetricsRegistry> {
    Arc::new(MetricsRegistry::new(&TelemetryConfig::default()))
}

// =============================================================================
// Test factory
// =============================================================================

#[derive(Debug, Deserialize)]
struct GreetingConfig {
    plugin_name: String,
    greeting: String,
    repeat: usize,
}

static CREATED: AtomicUsize = AtomicUsize::new(0);

struct GreetingFactory;

impl PluginFactory<String> for GreetingFactory {
    fn name(&self) -> &'static str {
        "greeting"
    }

    fn description(&self) -> &'static str {
        "Repeats a greeting."
    }

    fn default_config(&self) -> &'static str {
        "greeting: hello\nrepeat: 1\n"
    }

    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<String> {
        CREATED.fetch_add(1, Ordering::SeqCst);
        let cfg: GreetingConfig = config
            .parse()
            .map_err(|e| invalid(Category::Filter, self.name(), e))?;
        assert_eq!(cfg.plugin_name, "greeting");
        Ok(format!("{}:{}", ctx.pipe, cfg.greeting.repeat(cfg.repeat)))
    }
}

struct BrokenDefaultsFactory;

impl PluginFactory<String> for BrokenDefaultsFactory {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn description(&self) -> &'static str {
        "Ships defaults that are not a mapping."
    }

    fn default_config(&self) -> &'static str {
        "- a\n- b\n"
    }

    fn create(&self, _config: &PluginConfig, _ctx: &BuildContext<'_>) -> Result<String> {
        Ok(String::new())
    }
}

fn greeting_registry() -> TypedRegistry<String> {
    let mut registry = TypedRegistry::new(Category::Filter);
    registry.register(GreetingFactory).unwrap();
    registry
}

// =============================================================================
// TypedRegistry
// =============================================================================

#[test]
fn test_create_uses_defaults() {
    let registry = greeting_registry();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);

    let out = registry.create(&PluginConfig::named("greeting"), &ctx).unwrap();
    assert_eq!(out, "trace:hello");
}

#[test]
fn test_user_values_override_defaults() {
    let registry = greeting_registry();
    let metrics = metrics();
    let ctx = BuildContext::new("log", &metrics);

    let config = PluginConfig::from_yaml("plugin_name: greeting\nrepeat: 3").unwrap();
    assert_eq!(registry.create(&config, &ctx).unwrap(), "log:hellohellohello");
}

#[test]
fn test_each_create_builds_a_fresh_instance() {
    let registry = greeting_registry();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);
    let before = CREATED.load(Ordering::SeqCst);

    registry.create(&PluginConfig::named("greeting"), &ctx).unwrap();
    registry.create(&PluginConfig::named("greeting"), &ctx).unwrap();
    assert!(CREATED.load(Ordering::SeqCst) >= before + 2);
}

#[test]
fn test_unknown_plugin_lists_available() {
    let registry = greeting_registry();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);

    let err = registry
        .create(&PluginConfig::named("farewell"), &ctx)
        .unwrap_err();
    match err {
        RuntimeError::UnknownPlugin {
            category,
            name,
            available,
        } => {
            assert_eq!(category, Category::Filter);
            assert_eq!(name, "farewell");
            assert_eq!(available, "greeting");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_plugin_name() {
    let registry = greeting_registry();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);

    let config = PluginConfig::from_yaml("greeting: hi").unwrap();
    assert!(matches!(
        registry.create(&config, &ctx),
        Err(RuntimeError::Config(_))
    ));
}

#[test]
fn test_duplicate_registration_rejected() {
    let mut registry = greeting_registry();
    assert!(matches!(
        registry.register(GreetingFactory),
        Err(RuntimeError::DuplicatePlugin {
            name: "greeting",
            ..
        })
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_bad_defaults_reported() {
    let mut registry = TypedRegistry::new(Category::Filter);
    registry.register(BrokenDefaultsFactory).unwrap();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);

    assert!(matches!(
        registry.create(&PluginConfig::named("broken"), &ctx),
        Err(RuntimeError::BadDefaults { name: "broken", .. })
    ));
}

#[test]
fn test_default_config_carries_plugin_name() {
    let registry = greeting_registry();
    let defaults = registry.default_config("greeting").unwrap();
    assert_eq!(defaults.plugin_name(), Some("greeting"));
    assert_eq!(defaults.get_str("greeting"), Some("hello"));
}

// =============================================================================
// Built-in plugins
// =============================================================================

#[test]
fn test_builtin_names() {
    let registry = PluginRegistry::builtin().unwrap();
    assert_eq!(registry.clients.names(), vec!["native-client"]);
    assert_eq!(registry.servers.names(), vec!["native-server"]);
    assert_eq!(registry.receivers.names(), vec!["native-receiver"]);
    assert_eq!(registry.fetchers.names(), vec!["self-meter"]);
    assert_eq!(
        registry.queues.names(),
        vec!["memory-queue", "mmap-queue", "none-queue"]
    );
    assert_eq!(registry.filters.names(), vec!["metadata", "noop"]);
    assert_eq!(registry.forwarders.names(), vec!["native-forwarder"]);
    assert_eq!(
        registry.fallbackers.names(),
        vec!["none-fallbacker", "timer-fallbacker"]
    );
    assert_eq!(registry.sinks.names(), vec!["log", "none"]);
}

#[test]
fn test_builtin_defaults_parse() {
    let registry = PluginRegistry::builtin().unwrap();
    for (category, docs) in registry.catalog() {
        assert!(!docs.is_empty(), "{category} has no plugins");
        for doc in docs {
            assert!(!doc.description.is_empty(), "{} has no description", doc.name);
            PluginConfig::from_yaml(doc.default_config)
                .unwrap_or_else(|e| panic!("{category}/{}: {e}", doc.name));
        }
    }
}

#[test]
fn test_builtin_queue_and_filter() {
    let registry = PluginRegistry::builtin().unwrap();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);

    let config = PluginConfig::from_yaml("plugin_name: memory-queue\npartition: 3").unwrap();
    let queue = registry.queues.create(&config, &ctx).unwrap();
    assert_eq!(queue.partition_count(), 3);

    let config = PluginConfig::from_yaml(
        "plugin_name: metadata\nconditions:\n  - key: service\n    operator: regex\n    value: '(['",
    )
    .unwrap();
    assert!(registry.filters.create(&config, &ctx).is_err());

    let filter = registry
        .filters
        .create(&PluginConfig::named("noop"), &ctx)
        .unwrap();
    assert_eq!(filter.name(), "noop");
}

#[test]
fn test_forwarder_requires_client() {
    let registry = PluginRegistry::builtin().unwrap();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);

    let err = registry
        .forwarders
        .create(&PluginConfig::named("native-forwarder"), &ctx)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RuntimeError::MissingShared {
            resource: "client",
            ..
        }
    ));
}

#[test]
fn test_receiver_requires_queue() {
    let registry = PluginRegistry::builtin().unwrap();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);

    let err = registry
        .receivers
        .create(&PluginConfig::named("native-receiver"), &ctx)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RuntimeError::MissingShared {
            resource: "queue",
            ..
        }
    ));
}

#[test]
fn test_timer_fallbacker_validates() {
    let registry = PluginRegistry::builtin().unwrap();
    let metrics = metrics();
    let ctx = BuildContext::new("trace", &metrics);

    let config = PluginConfig::from_yaml("plugin_name: timer-fallbacker\nmax_attempts: 0").unwrap();
    assert!(matches!(
        registry.fallbackers.create(&config, &ctx),
        Err(RuntimeError::Forward(_))
    ));

    let config = PluginConfig::from_yaml("plugin_name: timer-fallbacker\nmax_attempts: 5").unwrap();
    let fallbacker = registry.fallbackers.create(&config, &ctx).unwrap();
    assert_eq!(fallbacker.name(), "timer-fallbacker");
}
