//! Client-side configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ManifestResult;

/// Server context the client talks to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the walrus server.
    pub server: String,
    pub token: String,
    /// Default project for objects that do not name one.
    pub project: String,
    /// Default environment for objects that do not name one.
    pub environment: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Per-request timeout in seconds; 0 disables it.
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            request_timeout_secs: 30,
            ..Default::default()
        }
    }

    /// Load a config file (YAML or JSON).
    pub fn load(path: &Path) -> ManifestResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_scope(mut self, project: impl Into<String>, environment: impl Into<String>) -> Self {
        self.project = project.into();
        self.environment = environment.into();
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Exponential retry schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub duration: Duration,
    pub factor: f64,
    /// Attempts, the first one included.
    pub steps: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(100),
            factor: 2.0,
            steps: 3,
        }
    }
}

impl BackoffConfig {
    /// Delays slept between attempts.
    pub fn delays(&self) -> Vec<Duration> {
        let mut delay = self.duration;
        (1..self.steps.max(1))
            .map(|_| {
                let current = delay;
                delay = delay.mul_f64(self.factor);
                current
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
        }
    }
}
