//! Per-plugin configuration maps
//!
//! Every plugin instance is configured by a YAML mapping carrying a required
//! `plugin_name` plus plugin-specific keys. The runtime merges the plugin's
//! default YAML underneath the user's map and then deserializes the result
//! into the plugin's typed config.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::env;
use crate::error::{ConfigError, Result};

/// Key holding the plugin name in every plugin map
pub const PLUGIN_NAME_KEY: &str = "plugin_name";

/// Untyped configuration for one plugin instance
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PluginConfig(Mapping);

impl PluginConfig {
    /// Empty config naming the given plugin
    pub fn named(plugin_name: impl Into<String>) -> Self {
        let mut map = Mapping::new();
        map.insert(
            Value::String(PLUGIN_NAME_KEY.into()),
            Value::String(plugin_name.into()),
        );
        Self(map)
    }

    /// Parse a YAML mapping, expanding env references
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut value: Value = serde_yaml::from_str(yaml)?;
        env::expand_value(&mut value)?;
        match value {
            Value::Mapping(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(ConfigError::invalid_value(
                "plugin",
                "<inline>",
                "config",
                format!("expected a mapping, got {}", value_kind(&other)),
            )),
        }
    }

    /// Plugin name, if present
    pub fn plugin_name(&self) -> Option<&str> {
        self.0.get(PLUGIN_NAME_KEY).and_then(Value::as_str)
    }

    /// Plugin name, or a `MissingField` error naming the owner
    pub fn require_plugin_name(&self, component: &'static str, owner: &str) -> Result<&str> {
        self.plugin_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ConfigError::missing_field(component, owner, PLUGIN_NAME_KEY))
    }

    /// Raw value for a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for a key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Set a key, replacing any previous value
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(Value::String(key.into()), value.into());
    }

    /// Underlying mapping
    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    /// Overlay this config on top of `defaults`
    ///
    /// Nested mappings merge key by key; any other user value replaces the
    /// default outright.
    #[must_use]
    pub fn merged_over(&self, defaults: &PluginConfig) -> PluginConfig {
        let mut merged = defaults.0.clone();
        merge_mapping(&mut merged, &self.0);
        PluginConfig(merged)
    }

    /// Deserialize into a typed config
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_yaml::from_value(Value::Mapping(self.0.clone()))?)
    }
}

fn merge_mapping(base: &mut Mapping, overlay: &Mapping) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Mapping(base_inner)), Value::Mapping(overlay_inner)) => {
                merge_mapping(base_inner, overlay_inner);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
