//! Error types for manifest operations.

use thiserror::Error;

/// Result type alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors that can occur while loading or operating on manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The server asked to try again later (conflict or rate limit).
    #[error("Retryable: {0}")]
    Retryable(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl ManifestError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ManifestError::Retryable(_))
    }
}

/// Classify a response status.
///
/// Conflicts and rate limits are retryable; any other non-2xx status is
/// terminal and carries the response body.
pub fn check_status(status: u16, body: impl Into<String>) -> ManifestResult<()> {
    match status {
        200..=299 => Ok(()),
        _ => Err(status_error(status, body)),
    }
}

/// Error for a non-2xx response status.
pub fn status_error(status: u16, body: impl Into<String>) -> ManifestError {
    match status {
        409 | 429 => ManifestError::Retryable(format!("status {}: {}", status, body.into())),
        _ => ManifestError::Api {
            status,
            body: body.into(),
        },
    }
}

/// Fold the errors of concurrent requests into one.
///
/// A batch containing any retryable failure is retryable as a whole.
pub(crate) fn aggregate(errors: Vec<ManifestError>) -> Option<ManifestError> {
    if errors.len() <= 1 {
        return errors.into_iter().next();
    }
    if errors.iter().any(ManifestError::is_retryable) {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Some(ManifestError::Retryable(joined));
    }
    errors.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        assert!(check_status(201, "").is_ok());
        assert!(check_status(409, "conflict").unwrap_err().is_retryable());
        assert!(check_status(429, "slow down").unwrap_err().is_retryable());

        match check_status(500, "boom").unwrap_err() {
            ManifestError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_aggregate_prefers_retryable() {
        assert!(aggregate(Vec::new()).is_none());

        let err = aggregate(vec![
            ManifestError::Api {
                status: 500,
                body: "boom".into(),
            },
            ManifestError::Retryable("status 409: busy".into()),
        ])
        .unwrap();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("boom"));
    }
}
