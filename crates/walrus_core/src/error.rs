//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while orchestrating runs.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Another run of the resource is still executing. Not retryable.
    #[error("deployment is running")]
    DeploymentRunning,

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid run state: {0}")]
    InvalidState(String),

    #[error("Invalid connector {id}: {reason}")]
    InvalidConnector { id: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    Config(#[from] walrus_config::ConfigError),

    #[error("State error: {0}")]
    State(#[from] walrus_state::StateError),

    #[error("Runner error: {0}")]
    Runner(#[from] walrus_runner::RunnerError),

    #[error(transparent)]
    Multi(#[from] MultiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Several independent failures reported together.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{}", .errors.join("; "))]
pub struct MultiError {
    pub errors: Vec<String>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl ToString) {
        self.errors.push(err.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok` when nothing was collected.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}
