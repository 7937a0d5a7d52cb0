//! Docker implementation of [`JobScheduler`].
//!
//! A job is a single container named after the job, so it is also its own
//! pod. Secrets are directories under a private temporary root that are bind
//! mounted read-only into the container.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::service::{
    ContainerInspectResponse, ContainerStateStatusEnum, HostConfig, Mount, MountTypeEnum,
};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::model::{Job, JobSpec, LogOptions, Pod, PodPhase, Secret};
use crate::scheduler::{JobScheduler, LogStream};

/// Scheduler running deployment jobs as local containers.
pub struct DockerScheduler {
    client: Docker,
    secrets_root: PathBuf,
    _secrets_dir: Option<TempDir>,
}

impl DockerScheduler {
    /// Connect to the local Docker daemon.
    pub async fn new() -> RunnerResult<Self> {
        let client = Docker::connect_with_local_defaults()?;
        client.ping().await?;
        Self::with_client(client)
    }

    /// Connect to a Docker daemon over HTTP.
    pub async fn with_host(host: &str) -> RunnerResult<Self> {
        let client = Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)?;
        client.ping().await?;
        Self::with_client(client)
    }

    fn with_client(client: Docker) -> RunnerResult<Self> {
        let dir = tempfile::Builder::new().prefix("walrus-secrets-").tempdir()?;
        Ok(Self {
            client,
            secrets_root: dir.path().to_path_buf(),
            _secrets_dir: Some(dir),
        })
    }

    /// Keep secrets under a fixed directory instead of a temporary one.
    pub fn with_secrets_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.secrets_root = root.into();
        self._secrets_dir = None;
        self
    }

    fn secret_dir(&self, name: &str) -> RunnerResult<PathBuf> {
        checked_file_name(name)?;
        Ok(self.secrets_root.join(name))
    }

    async fn ensure_image(&self, image: &str) -> RunnerResult<()> {
        match self.client.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        info!("Pulling image {}", image);
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => return Err(RunnerError::ImagePullFailed(e.to_string())),
            }
        }
        Ok(())
    }

    async fn inspect(&self, name: &str) -> RunnerResult<Option<ContainerInspectResponse>> {
        match self
            .client
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(c) => Ok(Some(c)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn logs_options(&self, follow: bool, tail_lines: Option<usize>) -> LogsOptions<String> {
        LogsOptions::<String> {
            follow,
            stdout: true,
            stderr: true,
            tail: tail_lines
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl JobScheduler for DockerScheduler {
    async fn is_available(&self) -> RunnerResult<bool> {
        match self.client.ping().await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn create_secret(&self, secret: &Secret) -> RunnerResult<()> {
        let dir = self.secret_dir(&secret.name)?;
        if dir.exists() {
            return Err(RunnerError::AlreadyExists {
                kind: "secret",
                name: secret.name.clone(),
            });
        }

        tokio::fs::create_dir_all(&dir).await?;
        for (file, content) in &secret.data {
            checked_file_name(file)?;
            tokio::fs::write(dir.join(file), content).await?;
        }

        debug!("Created secret {} with {} files", secret.name, secret.data.len());
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> RunnerResult<()> {
        let dir = self.secret_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_job(&self, spec: &JobSpec) -> RunnerResult<Job> {
        if self.inspect(&spec.name).await?.is_some() {
            return Err(RunnerError::AlreadyExists {
                kind: "job",
                name: spec.name.clone(),
            });
        }

        let secret_dir = self.secret_dir(&spec.secret_name)?;
        if !secret_dir.exists() {
            return Err(RunnerError::NotFound {
                kind: "secret",
                name: spec.secret_name.clone(),
            });
        }

        self.ensure_image(&spec.image).await?;

        let mounts = vec![Mount {
            target: Some(spec.secret_mount_path.clone()),
            source: Some(secret_dir.to_string_lossy().to_string()),
            typ: Some(MountTypeEnum::BIND),
            read_only: Some(true),
            ..Default::default()
        }];

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            mounts: Some(mounts),
            auto_remove: Some(false),
            network_mode: spec.network_mode.clone(),
            ..Default::default()
        };

        let labels: HashMap<String, String> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: spec.workdir.clone(),
            env: Some(env),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };
        let container = self.client.create_container(Some(options), config).await?;

        self.client
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await?;

        info!("Started job {} ({})", spec.name, &container.id);
        Ok(Job::new(spec.name.clone(), spec.labels.clone()))
    }

    async fn get_job(&self, name: &str) -> RunnerResult<Option<Job>> {
        Ok(self.inspect(name).await?.map(|c| job_from_container(name, &c)))
    }

    async fn list_jobs(&self, label: &str, value: &str) -> RunnerResult<Vec<Job>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}={}", label, value)]);

        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let mut jobs = Vec::new();
        for summary in containers {
            let name = summary
                .names
                .as_ref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/').to_string());
            let Some(name) = name else { continue };

            if let Some(c) = self.inspect(&name).await? {
                jobs.push(job_from_container(&name, &c));
            }
        }
        Ok(jobs)
    }

    async fn delete_job(&self, name: &str) -> RunnerResult<()> {
        match self
            .client
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pods(&self, job_name: &str) -> RunnerResult<Vec<Pod>> {
        Ok(self
            .inspect(job_name)
            .await?
            .map(|c| vec![Pod::new(job_name, job_name, pod_phase(&c))])
            .unwrap_or_default())
    }

    async fn pod_logs(&self, pod_name: &str, opts: &LogOptions) -> RunnerResult<String> {
        let mut output = String::new();
        let mut stream = self
            .client
            .logs(pod_name, Some(self.logs_options(opts.follow, opts.tail_lines)));

        while let Some(result) = stream.next().await {
            match result? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(output)
    }

    async fn stream_pod_logs(&self, pod_name: &str) -> RunnerResult<LogStream> {
        let stream = self
            .client
            .logs(pod_name, Some(self.logs_options(true, None)))
            .filter_map(|result| async move {
                match result {
                    Ok(LogOutput::StdOut { message })
                    | Ok(LogOutput::StdErr { message })
                    | Ok(LogOutput::Console { message }) => {
                        Some(Ok(String::from_utf8_lossy(&message).to_string()))
                    }
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(RunnerError::from(e))),
                }
            });
        Ok(stream.boxed())
    }
}

/// Reject names that would escape the secret directory.
fn checked_file_name(name: &str) -> RunnerResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(RunnerError::InvalidSecretKey(name.to_string())),
    }
}

fn job_from_container(name: &str, c: &ContainerInspectResponse) -> Job {
    let labels: BTreeMap<String, String> = c
        .config
        .as_ref()
        .and_then(|cfg| cfg.labels.clone())
        .map(|l| l.into_iter().collect())
        .unwrap_or_default();

    let create_time = c
        .created
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut job = Job {
        name: name.to_string(),
        labels,
        active: 0,
        succeeded: 0,
        failed: 0,
        create_time,
    };

    match pod_phase(c) {
        PodPhase::Succeeded => job.succeeded = 1,
        PodPhase::Failed => job.failed = 1,
        PodPhase::Running | PodPhase::Pending => job.active = 1,
        PodPhase::Unknown => warn!("Job {} is in an unknown state", name),
    }
    job
}

fn pod_phase(c: &ContainerInspectResponse) -> PodPhase {
    let Some(state) = c.state.as_ref() else {
        return PodPhase::Unknown;
    };

    match state.status {
        Some(ContainerStateStatusEnum::CREATED) => PodPhase::Pending,
        Some(ContainerStateStatusEnum::RUNNING)
        | Some(ContainerStateStatusEnum::RESTARTING)
        | Some(ContainerStateStatusEnum::PAUSED) => PodPhase::Running,
        Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
            if state.exit_code == Some(0) {
                PodPhase::Succeeded
            } else {
                PodPhase::Failed
            }
        }
        _ => PodPhase::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::service::ContainerState;

    fn container(status: ContainerStateStatusEnum, exit_code: i64) -> ContainerInspectResponse {
        ContainerInspectResponse {
            created: Some("2024-01-01T00:00:00Z".to_string()),
            state: Some(ContainerState {
                status: Some(status),
                exit_code: Some(exit_code),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_checked_file_name() {
        assert!(checked_file_name("main.tf").is_ok());
        assert!(checked_file_name("configc1").is_ok());
        assert!(checked_file_name("../etc").is_err());
        assert!(checked_file_name("a/b").is_err());
        assert!(checked_file_name("").is_err());
    }

    #[test]
    fn test_job_from_container() {
        let job = job_from_container("tf-job-apply-1", &container(ContainerStateStatusEnum::EXITED, 0));
        assert!(job.is_succeeded());
        assert_eq!(job.create_time.to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let job = job_from_container("tf-job-apply-1", &container(ContainerStateStatusEnum::EXITED, 1));
        assert_eq!(job.failed, 1);

        let job = job_from_container("tf-job-apply-1", &container(ContainerStateStatusEnum::RUNNING, 0));
        assert!(!job.is_finished());
    }

    #[test]
    fn test_pod_phase() {
        assert_eq!(
            pod_phase(&container(ContainerStateStatusEnum::CREATED, 0)),
            PodPhase::Pending
        );
        assert_eq!(
            pod_phase(&ContainerInspectResponse::default()),
            PodPhase::Unknown
        );
    }
}
