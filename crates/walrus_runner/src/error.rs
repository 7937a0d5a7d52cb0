//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while scheduling deployment jobs.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Scheduler not available: {0}")]
    Unavailable(String),

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Image pull failed: {0}")]
    ImagePullFailed(String),

    #[error("Invalid secret key: {0:?}")]
    InvalidSecretKey(String),

    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
