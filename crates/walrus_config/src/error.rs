//! Error types for the config compiler.

use thiserror::Error;

/// Result type alias for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while compiling terraform configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid block type: {0:?}")]
    InvalidBlockType(String),

    #[error("Invalid attribute name: {0:?}")]
    InvalidAttributeName(String),

    #[error("Unsupported value for {name}: {reason}")]
    UnsupportedValue { name: String, reason: String },

    #[error("Invalid connector {id}: {reason}")]
    InvalidConnector { id: String, reason: String },

    #[error("Variable {0} not found")]
    MissingVariable(String),

    #[error("Resource {resource} dependency output {output} not found")]
    MissingDependencyOutput { resource: String, output: String },

    #[error("Invalid interpolation pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
