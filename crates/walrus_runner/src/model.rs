//! Workload objects exchanged with a scheduler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named bag of files mounted into a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// File name to content.
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn file(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.data.insert(name.into(), content.into());
        self
    }
}

/// What a scheduler is asked to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub image: String,
    pub command: Vec<String>,
    pub workdir: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Secret mounted read-only at `secret_mount_path`.
    pub secret_name: String,
    pub secret_mount_path: String,
    pub backoff_limit: i32,
    pub ttl_seconds_after_finished: u64,
    pub network_mode: Option<String>,
}

impl JobSpec {
    pub fn label_value(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Observed state of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub create_time: DateTime<Utc>,
}

impl Job {
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            labels,
            active: 1,
            succeeded: 0,
            failed: 0,
            create_time: Utc::now(),
        }
    }

    pub fn label_value(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Whether the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.succeeded > 0 || self.failed > 0
    }

    pub fn is_succeeded(&self) -> bool {
        self.succeeded > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// A unit of execution belonging to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    pub job_name: String,
    pub phase: PodPhase,
}

impl Pod {
    pub fn new(name: impl Into<String>, job_name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            job_name: job_name.into(),
            phase,
        }
    }

    /// Logs can be read once the pod has started.
    pub fn is_ready(&self) -> bool {
        !matches!(self.phase, PodPhase::Pending | PodPhase::Unknown)
    }
}

/// Options for reading pod logs.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Keep the stream open until the pod exits.
    pub follow: bool,
    /// Only return the last lines.
    pub tail_lines: Option<usize>,
}

impl LogOptions {
    pub fn follow() -> Self {
        Self {
            follow: true,
            tail_lines: None,
        }
    }

    pub fn tail(lines: usize) -> Self {
        Self {
            follow: false,
            tail_lines: Some(lines),
        }
    }
}
