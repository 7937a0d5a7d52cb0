//! Mock job scheduler for testing.
//!
//! Keeps secrets, jobs and pods in memory and captures every call so tests
//! can drive a run through its lifecycle without a cluster.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;

use crate::error::{RunnerError, RunnerResult};
use crate::model::{Job, JobSpec, LogOptions, Pod, PodPhase, Secret};
use crate::scheduler::{JobScheduler, LogStream};

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    /// Secret, job or pod name the call addressed.
    pub name: Option<String>,
}

/// In-memory scheduler.
#[derive(Clone)]
pub struct MockScheduler {
    available: Arc<RwLock<bool>>,
    secrets: Arc<RwLock<BTreeMap<String, Secret>>>,
    jobs: Arc<RwLock<BTreeMap<String, Job>>>,
    specs: Arc<RwLock<BTreeMap<String, JobSpec>>>,
    /// Pods keyed by job name.
    pods: Arc<RwLock<BTreeMap<String, Vec<Pod>>>>,
    /// Logs keyed by pod name.
    logs: Arc<RwLock<BTreeMap<String, String>>>,
    /// Number of `list_pods` calls that still report pods as pending.
    pending_polls: Arc<AtomicUsize>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    simulate_failure: Arc<RwLock<Option<String>>>,
    failing_methods: Arc<RwLock<BTreeSet<String>>>,
}

impl Default for MockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScheduler {
    pub fn new() -> Self {
        Self {
            available: Arc::new(RwLock::new(true)),
            secrets: Arc::new(RwLock::new(BTreeMap::new())),
            jobs: Arc::new(RwLock::new(BTreeMap::new())),
            specs: Arc::new(RwLock::new(BTreeMap::new())),
            pods: Arc::new(RwLock::new(BTreeMap::new())),
            logs: Arc::new(RwLock::new(BTreeMap::new())),
            pending_polls: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
            failing_methods: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    pub fn set_available(self, available: bool) -> Self {
        *self.available.write() = available;
        self
    }

    /// Fail every call with the given message.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Fail calls to one method only.
    pub fn fail_method(self, method: impl Into<String>) -> Self {
        self.failing_methods.write().insert(method.into());
        self
    }

    /// Report pods as pending for the next `polls` pod listings.
    pub fn pods_pending_for(self, polls: usize) -> Self {
        self.pending_polls.store(polls, Ordering::SeqCst);
        self
    }

    /// Register a pod for a job.
    pub fn with_pod(self, pod: Pod) -> Self {
        self.pods
            .write()
            .entry(pod.job_name.clone())
            .or_default()
            .push(pod);
        self
    }

    /// Set the logs a pod returns.
    pub fn with_logs(self, pod_name: impl Into<String>, logs: impl Into<String>) -> Self {
        self.logs.write().insert(pod_name.into(), logs.into());
        self
    }

    /// Register an already running job.
    pub fn with_job(self, job: Job) -> Self {
        self.jobs.write().insert(job.name.clone(), job);
        self
    }

    /// Move a job and its pods to a terminal state.
    pub fn finish_job(&self, name: &str, succeeded: bool) -> Option<Job> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(name)?;
        job.active = 0;
        if succeeded {
            job.succeeded = 1;
        } else {
            job.failed = 1;
        }

        let phase = if succeeded {
            PodPhase::Succeeded
        } else {
            PodPhase::Failed
        };
        if let Some(pods) = self.pods.write().get_mut(name) {
            for pod in pods {
                pod.phase = phase;
            }
        }

        Some(job.clone())
    }

    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.secrets.read().get(name).cloned()
    }

    pub fn job(&self, name: &str) -> Option<Job> {
        self.jobs.read().get(name).cloned()
    }

    pub fn job_spec(&self, name: &str) -> Option<JobSpec> {
        self.specs.read().get(name).cloned()
    }

    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    fn record_call(&self, method: &str, name: Option<&str>) -> RunnerResult<()> {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            name: name.map(str::to_string),
        });

        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }
        if self.failing_methods.read().contains(method) {
            return Err(RunnerError::ExecutionFailed(format!("{} failed", method)));
        }
        Ok(())
    }

    /// Logs of a pod; a known pod without registered logs has printed nothing.
    fn logs_of(&self, pod_name: &str) -> RunnerResult<String> {
        if let Some(logs) = self.logs.read().get(pod_name) {
            return Ok(logs.clone());
        }
        let known = self
            .pods
            .read()
            .values()
            .any(|pods| pods.iter().any(|p| p.name == pod_name));
        if known {
            Ok(String::new())
        } else {
            Err(RunnerError::NotFound {
                kind: "pod",
                name: pod_name.to_string(),
            })
        }
    }

    /// Register logs for a pod created later by `create_job`.
    pub fn set_logs(&self, pod_name: impl Into<String>, logs: impl Into<String>) {
        self.logs.write().insert(pod_name.into(), logs.into());
    }
}

#[async_trait]
impl JobScheduler for MockScheduler {
    async fn is_available(&self) -> RunnerResult<bool> {
        self.record_call("is_available", None)?;
        Ok(*self.available.read())
    }

    async fn create_secret(&self, secret: &Secret) -> RunnerResult<()> {
        self.record_call("create_secret", Some(&secret.name))?;
        let mut secrets = self.secrets.write();
        if secrets.contains_key(&secret.name) {
            return Err(RunnerError::AlreadyExists {
                kind: "secret",
                name: secret.name.clone(),
            });
        }
        secrets.insert(secret.name.clone(), secret.clone());
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> RunnerResult<()> {
        self.record_call("delete_secret", Some(name))?;
        self.secrets.write().remove(name);
        Ok(())
    }

    async fn create_job(&self, spec: &JobSpec) -> RunnerResult<Job> {
        self.record_call("create_job", Some(&spec.name))?;
        if self.jobs.read().contains_key(&spec.name) {
            return Err(RunnerError::AlreadyExists {
                kind: "job",
                name: spec.name.clone(),
            });
        }

        let job = Job::new(spec.name.clone(), spec.labels.clone());
        self.jobs.write().insert(spec.name.clone(), job.clone());
        self.specs.write().insert(spec.name.clone(), spec.clone());
        self.pods
            .write()
            .entry(spec.name.clone())
            .or_insert_with(|| vec![Pod::new(format!("{}-0", spec.name), spec.name.clone(), PodPhase::Running)]);
        Ok(job)
    }

    async fn get_job(&self, name: &str) -> RunnerResult<Option<Job>> {
        self.record_call("get_job", Some(name))?;
        Ok(self.jobs.read().get(name).cloned())
    }

    async fn list_jobs(&self, label: &str, value: &str) -> RunnerResult<Vec<Job>> {
        self.record_call("list_jobs", None)?;
        Ok(self
            .jobs
            .read()
            .values()
            .filter(|j| j.label_value(label) == Some(value))
            .cloned()
            .collect())
    }

    async fn delete_job(&self, name: &str) -> RunnerResult<()> {
        self.record_call("delete_job", Some(name))?;
        self.jobs.write().remove(name);
        self.pods.write().remove(name);
        Ok(())
    }

    async fn list_pods(&self, job_name: &str) -> RunnerResult<Vec<Pod>> {
        self.record_call("list_pods", Some(job_name))?;
        let mut pods = self.pods.read().get(job_name).cloned().unwrap_or_default();

        let pending = self
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if pending {
            for pod in &mut pods {
                pod.phase = PodPhase::Pending;
            }
        }
        Ok(pods)
    }

    async fn pod_logs(&self, pod_name: &str, opts: &LogOptions) -> RunnerResult<String> {
        self.record_call("pod_logs", Some(pod_name))?;
        let logs = self.logs_of(pod_name)?;
        Ok(match opts.tail_lines {
            Some(n) => {
                let lines: Vec<&str> = logs.lines().collect();
                lines[lines.len().saturating_sub(n)..].join("\n")
            }
            None => logs,
        })
    }

    async fn stream_pod_logs(&self, pod_name: &str) -> RunnerResult<LogStream> {
        self.record_call("stream_pod_logs", Some(pod_name))?;
        let logs = self.logs_of(pod_name)?;
        let chunks: Vec<RunnerResult<String>> =
            logs.split_inclusive('\n').map(|l| Ok(l.to_string())).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}
