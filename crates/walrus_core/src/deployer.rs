//! Start, stop and cancel deployment runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use walrus_config::{compile_run, file_name, Connector, OutputValue, RunConfigInput};
use walrus_runner::{job_name, secret_name, JobConfig, JobScheduler, JobType, Secret, RUN_LABEL};
use walrus_state::parse_outputs;

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::models::{Resource, Run, RunStatus, RunType};
use crate::notifier::Notifier;
use crate::store::{Store, Tx};

/// Key of the kubeconfig in a kubernetes connector's config data.
const KUBECONFIG_KEY: &str = "kubeconfig";
const CANCELED_MESSAGE: &str = "canceled";

/// Where runs report back to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    /// Address the state backend of a run points at.
    pub server_url: String,
    /// Token runs authenticate to the backend with.
    pub token: String,
    pub skip_tls_verify: bool,
    pub job: JobConfig,
}

impl DeployerConfig {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn with_job(mut self, job: JobConfig) -> Self {
        self.job = job;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Run whose attributes and variables the new run reuses.
    pub clone_from: Option<String>,
}

/// Creates runs and hands them to the scheduler.
pub struct Deployer {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn JobScheduler>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: DeployerConfig,
}

impl Deployer {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn JobScheduler>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: DeployerConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            notifier,
            clock,
            config,
        }
    }

    /// Create or update the resource.
    pub async fn apply(&self, resource_id: &str, opts: &DeployOptions) -> CoreResult<Run> {
        self.deploy(resource_id, opts, JobType::Apply).await
    }

    /// Tear the resource down.
    pub async fn destroy(&self, resource_id: &str, opts: &DeployOptions) -> CoreResult<Run> {
        self.deploy(resource_id, opts, JobType::Destroy).await
    }

    async fn deploy(
        &self,
        resource_id: &str,
        opts: &DeployOptions,
        job_type: JobType,
    ) -> CoreResult<Run> {
        let resource = self.store.get_resource(resource_id)?;
        let cloned = match &opts.clone_from {
            Some(id) => Some(self.store.get_run(id)?),
            None => None,
        };

        let mut run = self.create_run(&resource, job_type, cloned.as_ref())?;
        info!("Created {} run {} of resource {}", job_type, run.id, resource.name);

        match self.start(&resource, &mut run, job_type).await {
            Ok(()) => Ok(run),
            Err(e) => {
                self.finalize_on_error(&mut run, &e).await;
                Err(e)
            }
        }
    }

    /// Insert a pending run unless another run of the resource is in flight.
    fn create_run(
        &self,
        resource: &Resource,
        job_type: JobType,
        cloned: Option<&Run>,
    ) -> CoreResult<Run> {
        let now = self.clock.now();
        let mut created = None;

        self.store.transaction(&mut |tx: &mut dyn Tx| {
            let latest = tx.latest_run(&resource.id);
            if latest.as_ref().is_some_and(|r| !r.status.is_terminal()) {
                return Err(CoreError::DeploymentRunning);
            }

            let run_type = match job_type {
                JobType::Destroy => RunType::Delete,
                JobType::Apply if latest.is_some() => RunType::Update,
                JobType::Apply => RunType::Create,
            };

            let mut run = Run::new(resource, run_type);
            run.create_time = now;
            if let Some(src) = cloned {
                run.computed_attributes = src.computed_attributes.clone();
                run.variables = src.variables.clone();
            }
            if let Some(latest) = &latest {
                run.previous_required_providers = latest.previous_required_providers.clone();
            }

            created = Some(tx.insert_run(run)?);
            Ok(())
        })?;

        created.ok_or_else(|| CoreError::Store("run was not created".to_string()))
    }

    async fn start(&self, resource: &Resource, run: &mut Run, job_type: JobType) -> CoreResult<()> {
        let connectors = self
            .store
            .list_connectors(&resource.project_id, &resource.environment_id);

        let mut variables = self
            .store
            .list_variables(&resource.project_id, &resource.environment_id);
        for (name, value) in &run.variables {
            variables.entry(name.clone()).or_default().value = value.clone();
        }

        let mut module = resource.module.clone();
        module.attributes = run.computed_attributes.clone();

        let input = RunConfigInput {
            server_url: self.config.server_url.clone(),
            token: self.config.token.clone(),
            skip_tls_verify: self.config.skip_tls_verify,
            project_id: resource.project_id.clone(),
            environment_id: resource.environment_id.clone(),
            resource_id: resource.id.clone(),
            run_id: run.id.clone(),
            module,
            previous_required_providers: run.previous_required_providers.clone(),
            sensitive_module_variables: resource.sensitive_variables.clone(),
            variables,
            dependency_outputs: self.dependency_outputs(resource)?,
            connectors: connectors.clone(),
            secret_mount_path: self.config.job.secret_mount_path.clone(),
        };

        let compiled = compile_run(&input)?;
        run.input_configs = compiled
            .files
            .iter()
            .map(|(key, bytes)| (file_name(key), bytes.clone()))
            .collect();
        run.variables = compiled.variables;
        run.previous_required_providers = compiled.required_providers;

        let secret = self.secret(run, &connectors)?;
        self.scheduler.create_secret(&secret).await?;

        let spec = self.config.job.job_spec(job_type, &run.id);
        self.scheduler.create_job(&spec).await?;

        run.status = RunStatus::Running;
        self.store.update_run(run)?;

        // The job owns the run from here on; a lost event must not fail it.
        if let Err(e) = self.notifier.notify(run).await {
            warn!("Failed to notify run {}: {}", run.id, e);
        }

        info!("Started job {} for run {}", spec.name, run.id);
        Ok(())
    }

    /// Compiled files plus one kubeconfig per kubernetes connector.
    fn secret(&self, run: &Run, connectors: &[Connector]) -> CoreResult<Secret> {
        let mut secret = Secret::new(secret_name(&run.id)).label(RUN_LABEL, run.id.clone());
        for (name, bytes) in &run.input_configs {
            secret = secret.file(name.clone(), bytes.clone());
        }

        for connector in connectors.iter().filter(|c| c.is_kubernetes()) {
            let kubeconfig = connector
                .config_data
                .get(KUBECONFIG_KEY)
                .ok_or_else(|| CoreError::InvalidConnector {
                    id: connector.id.clone(),
                    reason: "missing kubeconfig".to_string(),
                })?;
            secret = secret.file(connector.secret_file_name(), kubeconfig.value.clone());
        }
        Ok(secret)
    }

    /// Outputs of the other resources in the environment, keyed `<resource>_<output>`.
    fn dependency_outputs(&self, resource: &Resource) -> CoreResult<BTreeMap<String, OutputValue>> {
        let mut outputs = BTreeMap::new();

        for other in self
            .store
            .list_resources(&resource.project_id, &resource.environment_id)
        {
            if other.id == resource.id {
                continue;
            }
            let state = self
                .store
                .list_runs(&other.id)
                .into_iter()
                .rev()
                .find(|r| r.status == RunStatus::Succeeded)
                .and_then(|r| r.output);
            let Some(state) = state else { continue };

            for (name, output) in parse_outputs(&state)? {
                outputs.insert(
                    format!("{}_{}", other.name, name),
                    OutputValue {
                        value: output.value,
                        sensitive: output.sensitive,
                    },
                );
            }
        }

        debug!("Resolved {} dependency outputs for {}", outputs.len(), resource.name);
        Ok(outputs)
    }

    /// Mark a run failed after an error interrupted it.
    async fn finalize_on_error(&self, run: &mut Run, err: &CoreError) {
        error!("Run {} failed: {}", run.id, err);

        run.status = RunStatus::Failed;
        run.status_message = err.to_string();
        run.duration_secs = (self.clock.now() - run.create_time).num_seconds();

        if let Err(e) = self.store.update_run(run) {
            warn!("Failed to update run {}: {}", run.id, e);
        }
        if let Err(e) = self.notifier.notify(run).await {
            warn!("Failed to notify run {}: {}", run.id, e);
        }
        if let Err(e) = self.scheduler.delete_secret(&secret_name(&run.id)).await {
            warn!("Failed to delete secret of run {}: {}", run.id, e);
        }
    }

    /// Stop an unfinished run.
    pub async fn cancel(&self, run_id: &str) -> CoreResult<Run> {
        let mut run = self.store.get_run(run_id)?;
        if run.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "run {} is already {:?}",
                run.id, run.status
            )));
        }

        self.scheduler
            .delete_job(&job_name(run.job_type(), &run.id))
            .await?;
        self.scheduler.delete_secret(&secret_name(&run.id)).await?;

        run.status = RunStatus::Failed;
        run.status_message = CANCELED_MESSAGE.to_string();
        run.duration_secs = (self.clock.now() - run.create_time).num_seconds();
        self.store.update_run(&run)?;
        self.notifier.notify(&run).await?;

        info!("Canceled run {}", run.id);
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::notifier::MockNotifier;
    use crate::store::MemoryStore;
    use walrus_config::ModuleConfig;
    use walrus_runner::MockScheduler;

    fn setup(scheduler: MockScheduler, notifier: MockNotifier) -> (Arc<MemoryStore>, Resource, Deployer) {
        let store = Arc::new(MemoryStore::new());
        let resource = Resource::new("web", "p", "e", ModuleConfig::new("web", "./web"));
        store.put_resource(resource.clone());

        let deployer = Deployer::new(
            store.clone(),
            Arc::new(scheduler),
            Arc::new(notifier),
            Arc::new(FakeClock::default()),
            DeployerConfig::new("https://walrus.local", "t0ken"),
        );
        (store, resource, deployer)
    }

    #[tokio::test]
    async fn test_apply_notifies_running() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|run| run.status == RunStatus::Running)
            .times(1)
            .returning(|_| Ok(()));

        let (_, resource, deployer) = setup(MockScheduler::new(), notifier);
        let run = deployer
            .apply(&resource.id, &DeployOptions::default())
            .await
            .unwrap();
        assert_eq!(run.run_type, RunType::Create);
    }

    #[tokio::test]
    async fn test_job_failure_finalizes_run() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|run| run.status == RunStatus::Failed && !run.status_message.is_empty())
            .times(1)
            .returning(|_| Ok(()));

        let scheduler = MockScheduler::new().fail_method("create_job");
        let (store, resource, deployer) = setup(scheduler, notifier);

        let err = deployer
            .apply(&resource.id, &DeployOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Runner(_)));

        let run = store.latest_run(&resource.id).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.status_message.contains("create_job failed"));
    }

    #[tokio::test]
    async fn test_notify_failure_keeps_job_running() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|run| run.status == RunStatus::Running)
            .times(1)
            .returning(|_| Err(CoreError::Store("bus down".to_string())));

        let scheduler = MockScheduler::new();
        let (store, resource, deployer) = setup(scheduler.clone(), notifier);

        let run = deployer
            .apply(&resource.id, &DeployOptions::default())
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(store.latest_run(&resource.id).unwrap().status, RunStatus::Running);
        assert!(scheduler.was_called("create_job"));
        assert!(!scheduler.was_called("delete_secret"));
        assert!(!scheduler.was_called("delete_job"));

        let err = deployer
            .apply(&resource.id, &DeployOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DeploymentRunning));
    }

    #[tokio::test]
    async fn test_kubernetes_connector_requires_kubeconfig() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(|_| Ok(()));

        let (store, resource, deployer) = setup(MockScheduler::new(), notifier);
        store.put_connector("p", "e", Connector::new("c1", "Kubernetes"));

        let err = deployer
            .apply(&resource.id, &DeployOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConnector { .. }));
        assert_eq!(store.latest_run(&resource.id).unwrap().status, RunStatus::Failed);
    }
}
