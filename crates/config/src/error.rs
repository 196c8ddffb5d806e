//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse YAML
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Environment reference without default and the variable is unset
    #[error("environment variable '{name}' is not set and has no default")]
    MissingEnv {
        /// Variable name
        name: String,
    },

    /// Validation error - required field missing
    #[error("{component} '{name}' is missing required field '{field}'")]
    MissingField {
        /// Component type (e.g., "pipe", "client")
        component: &'static str,
        /// Name of the component
        name: String,
        /// Missing field name
        field: &'static str,
    },

    /// Validation error - invalid value
    #[error("{component} '{name}' has invalid {field}: {message}")]
    InvalidValue {
        /// Component type
        component: &'static str,
        /// Name of the component
        name: String,
        /// Field name
        field: &'static str,
        /// Error message
        message: String,
    },

    /// Two components of one kind share a name
    #[error("duplicate {component} name '{name}'")]
    Duplicate {
        /// Component type
        component: &'static str,
        /// Name used twice
        name: String,
    },

    /// A pipe references a shared plugin that is not declared
    #[error("pipe '{pipe}' references unknown {component} '{name}'")]
    UnknownReference {
        /// Referencing pipe
        pipe: String,
        /// Kind of the missing plugin ("client", "server")
        component: &'static str,
        /// Referenced name
        name: String,
    },

    /// No pipes declared
    #[error("no pipes are configured - at least one pipe is required")]
    NoPipes,
}

impl ConfigError {
    /// Create a MissingField error
    pub fn missing_field(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
    ) -> Self {
        Self::MissingField {
            component,
            name: name.into(),
            field,
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            component,
            name: name.into(),
            field,
            message: message.into(),
        }
    }

    /// Create a Duplicate error
    pub fn duplicate(component: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            component,
            name: name.into(),
        }
    }

    /// Create an UnknownReference error
    pub fn unknown_reference(
        pipe: impl Into<String>,
        component: &'static str,
        name: impl Into<String>,
    ) -> Self {
        Self::UnknownReference {
            pipe: pipe.into(),
            component,
            name: name.into(),
        }
    }
}
