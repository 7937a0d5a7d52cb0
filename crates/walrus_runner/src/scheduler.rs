//! Job scheduler trait.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RunnerResult;
use crate::model::{Job, JobSpec, LogOptions, Pod, Secret};

/// Stream of log chunks.
pub type LogStream = BoxStream<'static, RunnerResult<String>>;

/// Where deployment jobs are executed.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Check if the scheduler can be reached.
    async fn is_available(&self) -> RunnerResult<bool>;

    async fn create_secret(&self, secret: &Secret) -> RunnerResult<()>;

    /// Delete a secret; deleting a missing secret succeeds.
    async fn delete_secret(&self, name: &str) -> RunnerResult<()>;

    async fn create_job(&self, spec: &JobSpec) -> RunnerResult<Job>;

    async fn get_job(&self, name: &str) -> RunnerResult<Option<Job>>;

    /// Jobs carrying the given label.
    async fn list_jobs(&self, label: &str, value: &str) -> RunnerResult<Vec<Job>>;

    /// Delete a job and its pods; deleting a missing job succeeds.
    async fn delete_job(&self, name: &str) -> RunnerResult<()>;

    async fn list_pods(&self, job_name: &str) -> RunnerResult<Vec<Pod>>;

    /// Logs of a pod read to the end.
    async fn pod_logs(&self, pod_name: &str, opts: &LogOptions) -> RunnerResult<String>;

    /// Logs of a pod as a stream, following while the pod runs.
    async fn stream_pod_logs(&self, pod_name: &str) -> RunnerResult<LogStream>;
}
