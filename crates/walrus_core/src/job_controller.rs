//! Follow deployment jobs to completion.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use walrus_runner::{job_name, secret_name, Job, JobScheduler, LogOptions, Pod, RUN_LABEL};
use walrus_state::{ParseOptions, StateParser};

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::models::{Run, RunStatus};
use crate::notifier::Notifier;
use crate::reconciler::{ReconcileReport, ResourceReconciler};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobControllerConfig {
    /// Interval between pod readiness checks.
    pub poll_interval: Duration,
    /// How long to wait for a pod to become ready.
    pub poll_timeout: Duration,
    /// Lines of the job log kept in a failed run's message.
    pub message_tail_lines: usize,
}

impl Default for JobControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(60),
            message_tail_lines: 20,
        }
    }
}

impl JobControllerConfig {
    pub fn with_poll(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }
}

/// Moves runs to their final status when their job finishes.
pub struct JobController {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn JobScheduler>,
    notifier: Arc<dyn Notifier>,
    reconciler: ResourceReconciler,
    clock: Arc<dyn Clock>,
    config: JobControllerConfig,
}

impl JobController {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn JobScheduler>,
        notifier: Arc<dyn Notifier>,
        reconciler: ResourceReconciler,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            notifier,
            reconciler,
            clock,
            config: JobControllerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: JobControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Record the state document the engine pushed for a run.
    pub fn record_state(&self, run_id: &str, state: Vec<u8>) -> CoreResult<()> {
        let mut run = self.store.get_run(run_id)?;
        run.output = Some(state);
        self.store.update_run(&run)
    }

    /// Reconcile the jobs of one run.
    pub async fn reconcile_run(&self, run_id: &str) -> CoreResult<Option<ReconcileReport>> {
        let mut report = None;
        for job in self.scheduler.list_jobs(RUN_LABEL, run_id).await? {
            if let Some(r) = self.reconcile(&job).await? {
                report = Some(r);
            }
        }
        Ok(report)
    }

    /// Finalize the run of a finished job.
    ///
    /// Jobs that are not walrus runs, are still active, or whose run is no
    /// longer running are ignored. Returns the instance reconciliation of a
    /// successful run.
    pub async fn reconcile(&self, job: &Job) -> CoreResult<Option<ReconcileReport>> {
        let Some(run_id) = job.label_value(RUN_LABEL) else {
            debug!("Skip job {} without run label", job.name);
            return Ok(None);
        };
        if !job.is_finished() {
            return Ok(None);
        }

        let mut run = self.store.get_run(run_id)?;
        if run.status != RunStatus::Running {
            debug!("Skip job {}: run {} is {:?}", job.name, run.id, run.status);
            return Ok(None);
        }

        let logs = self.job_logs(&job.name).await?;
        run.record = logs.clone();
        if job.is_succeeded() {
            run.status = RunStatus::Succeeded;
            run.status_message = String::new();
        } else {
            run.status = RunStatus::Failed;
            run.status_message = tail(&logs, self.config.message_tail_lines);
        }
        run.duration_secs = (self.clock.now() - run.create_time).num_seconds();

        let updated = self.store.update_run(&run);
        if updated.is_ok() {
            if let Err(e) = self.notifier.notify(&run).await {
                warn!("Failed to notify run {}: {}", run.id, e);
            }
        }
        self.scheduler.delete_secret(&secret_name(&run.id)).await?;
        updated?;

        info!("Run {} finished: {:?}", run.id, run.status);

        if run.status != RunStatus::Succeeded {
            return Ok(None);
        }
        self.reconcile_instances(&run).await.map(Some)
    }

    async fn reconcile_instances(&self, run: &Run) -> CoreResult<ReconcileReport> {
        let resource = self.store.get_resource(&run.resource_id)?;

        let parser = StateParser::new(ParseOptions::new(
            &resource.id,
            &resource.project_id,
            &resource.environment_id,
        ));
        let outcome = parser.parse(run.output.as_deref().unwrap_or_default())?;
        for e in &outcome.errors {
            warn!("Skipped resource in state of run {}: {}", run.id, e);
        }

        self.reconciler.reconcile(&resource, outcome.instances).await
    }

    /// Logs of all pods of a job.
    async fn job_logs(&self, job_name: &str) -> CoreResult<String> {
        let mut logs = String::new();
        for pod in self.scheduler.list_pods(job_name).await? {
            let pod_logs = self
                .scheduler
                .pod_logs(&pod.name, &LogOptions::default())
                .await?;
            logs.push_str(&pod_logs);
        }
        Ok(logs)
    }

    /// Follow the logs of a run's job into `out`.
    ///
    /// Returns without output when the job has no pods.
    pub async fn stream_logs<W>(&self, run_id: &str, out: &mut W) -> CoreResult<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let run = self.store.get_run(run_id)?;
        let job = job_name(run.job_type(), &run.id);

        let Some(pod) = self.wait_for_pod(&job).await? else {
            return Ok(());
        };

        let mut stream = self.scheduler.stream_pod_logs(&pod.name).await?;
        while let Some(chunk) = stream.next().await {
            out.write_all(chunk?.as_bytes()).await?;
        }
        out.flush().await?;
        Ok(())
    }

    async fn wait_for_pod(&self, job: &str) -> CoreResult<Option<Pod>> {
        let deadline = self.clock.now()
            + chrono::Duration::from_std(self.config.poll_timeout)
                .unwrap_or_else(|_| chrono::Duration::zero());

        loop {
            let pods = self.scheduler.list_pods(job).await?;
            if pods.is_empty() {
                return Ok(None);
            }
            if let Some(pod) = pods.into_iter().find(Pod::is_ready) {
                return Ok(Some(pod));
            }
            if self.clock.now() >= deadline {
                return Err(CoreError::Timeout(format!("pods of job {}", job)));
            }
            self.clock.sleep(self.config.poll_interval).await;
        }
    }
}

/// Last `lines` lines of `s`.
fn tail(s: &str, lines: usize) -> String {
    let all: Vec<&str> = s.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
