//! Error types for state parsing.

use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while parsing a state document.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Invalid state document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Invalid module format: {0}")]
    InvalidModule(String),

    #[error("Provider name error: {0}")]
    InvalidProvider(String),

    #[error("No id found in instance of {address}")]
    MissingId { address: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
