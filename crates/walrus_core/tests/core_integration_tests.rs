//! Integration tests for run orchestration.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use walrus_config::{Connector, ModuleConfig};
use walrus_core::{
    BroadcastNotifier, CoreError, DeployOptions, Deployer, DeployerConfig, FakeClock,
    JobController, JobControllerConfig, MemoryStore, NoopLabeler, Resource, ResourceReconciler,
    Run, RunStatus, RunType, Store,
};
use walrus_runner::{job_name, secret_name, JobType, MockScheduler, RUN_LABEL};

const K8S: &str = "provider[\"registry.terraform.io/hashicorp/kubernetes\"]";

struct Harness {
    store: Arc<MemoryStore>,
    scheduler: MockScheduler,
    notifier: BroadcastNotifier,
    clock: Arc<FakeClock>,
    resource: Resource,
}

impl Harness {
    fn new(scheduler: MockScheduler) -> Self {
        let store = Arc::new(MemoryStore::new());
        let resource = Resource::new("web", "p1", "e1", ModuleConfig::new("web", "./modules/web"));
        store.put_resource(resource.clone());
        store.put_connector(
            "p1",
            "e1",
            Connector::new("c1", "Kubernetes").with_config("kubeconfig", "apiVersion: v1", true),
        );

        Self {
            store,
            scheduler,
            notifier: BroadcastNotifier::default(),
            clock: Arc::new(FakeClock::default()),
            resource,
        }
    }

    fn deployer(&self) -> Deployer {
        Deployer::new(
            self.store.clone(),
            Arc::new(self.scheduler.clone()),
            Arc::new(self.notifier.clone()),
            self.clock.clone(),
            DeployerConfig::new("https://walrus.local", "t0ken"),
        )
    }

    fn controller(&self) -> JobController {
        let reconciler = ResourceReconciler::new(self.store.clone(), Arc::new(NoopLabeler));
        JobController::new(
            self.store.clone(),
            Arc::new(self.scheduler.clone()),
            Arc::new(self.notifier.clone()),
            reconciler,
            self.clock.clone(),
        )
        .with_config(JobControllerConfig::default().with_poll(Duration::from_secs(1), Duration::from_secs(5)))
    }

    async fn apply(&self) -> Result<Run, CoreError> {
        self.deployer()
            .apply(&self.resource.id, &DeployOptions::default())
            .await
    }
}

fn state(names: &[&str]) -> Vec<u8> {
    let resources: Vec<_> = names
        .iter()
        .map(|name| {
            json!({
                "module": "module.web",
                "mode": "managed",
                "type": "kubernetes_deployment",
                "name": "app",
                "provider": format!("{}.kubernetesconnector--c1", K8S),
                "instances": [{"schema_version": 1, "attributes": {"id": format!("default/{}", name)}}]
            })
        })
        .collect();
    json!({
        "version": 4,
        "terraform_version": "1.5.7",
        "serial": 1,
        "lineage": "abc",
        "outputs": {"endpoint": {"value": "10.0.0.5", "type": "string"}},
        "resources": resources,
        "check_results": null
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_apply_creates_secret_and_job() {
    let h = Harness::new(MockScheduler::new());
    let mut events = h.notifier.subscribe();

    let run = h.apply().await.unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.run_type, RunType::Create);
    assert_eq!(events.recv().await.unwrap().status, RunStatus::Running);

    let secret = h.scheduler.secret(&secret_name(&run.id)).unwrap();
    assert!(secret.data.contains_key("main.tf"));
    assert!(secret.data.contains_key("terraform.tfvars"));
    assert_eq!(secret.data["configc1"], b"apiVersion: v1".to_vec());

    let spec = h.scheduler.job_spec(&job_name(JobType::Apply, &run.id)).unwrap();
    assert_eq!(spec.label_value(RUN_LABEL), Some(run.id.as_str()));
    assert_eq!(spec.secret_name, secret_name(&run.id));

    let stored = h.store.get_run(&run.id).unwrap();
    assert_eq!(stored.status, RunStatus::Running);
    assert_eq!(stored.input_configs.len(), 2);
}

#[tokio::test]
async fn test_single_run_in_flight() {
    let h = Harness::new(MockScheduler::new());

    h.apply().await.unwrap();
    let err = h.apply().await.unwrap_err();

    assert!(matches!(err, CoreError::DeploymentRunning));
    assert_eq!(h.store.list_runs(&h.resource.id).len(), 1);
    assert_eq!(h.scheduler.get_method_calls("create_job").len(), 1);
}

#[tokio::test]
async fn test_concurrent_applies_start_one_run() {
    let h = Harness::new(MockScheduler::new());
    let (a, b) = tokio::join!(h.apply(), h.apply());

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.store.list_runs(&h.resource.id).len(), 1);
}

#[tokio::test]
async fn test_successful_job_reconciles_instances() {
    let h = Harness::new(MockScheduler::new());
    let controller = h.controller();

    let run = h.apply().await.unwrap();
    controller.record_state(&run.id, state(&["app"])).unwrap();

    // Still running: nothing happens.
    assert!(controller.reconcile_run(&run.id).await.unwrap().is_none());
    assert_eq!(h.store.get_run(&run.id).unwrap().status, RunStatus::Running);

    h.clock.advance(Duration::from_secs(42));
    h.scheduler
        .finish_job(&job_name(JobType::Apply, &run.id), true)
        .unwrap();

    let report = controller.reconcile_run(&run.id).await.unwrap().unwrap();
    assert_eq!(report.created.len(), 1);

    let finished = h.store.get_run(&run.id).unwrap();
    assert_eq!(finished.status, RunStatus::Succeeded);
    assert_eq!(finished.duration_secs, 42);
    assert!(h.scheduler.secret(&secret_name(&run.id)).is_none());

    let instances = h.store.list_instances(&h.resource.id);
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].connector_id, "c1");
    assert_eq!(instances[0].module, "web");

    // A finished job is only handled once.
    assert!(controller.reconcile_run(&run.id).await.unwrap().is_none());

    // The next apply updates.
    let next = h.apply().await.unwrap();
    assert_eq!(next.run_type, RunType::Update);
}

#[tokio::test]
async fn test_failed_job_keeps_log_tail() {
    let h = Harness::new(MockScheduler::new());
    let controller = h.controller();

    let run = h.apply().await.unwrap();
    let job = job_name(JobType::Apply, &run.id);
    h.scheduler
        .set_logs(format!("{}-0", job), "init\nplan\nError: quota exceeded\n");
    let finished = h.scheduler.finish_job(&job, false).unwrap();

    assert!(controller.reconcile(&finished).await.unwrap().is_none());

    let failed = h.store.get_run(&run.id).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert!(failed.status_message.ends_with("Error: quota exceeded"));
    assert!(failed.record.contains("plan"));
    assert!(h.scheduler.secret(&secret_name(&run.id)).is_none());
    assert!(h.store.list_instances(&h.resource.id).is_empty());

    // A failed run does not block the next one.
    assert!(h.apply().await.is_ok());
}

#[tokio::test]
async fn test_destroy_after_apply() {
    let h = Harness::new(MockScheduler::new());
    let controller = h.controller();

    let run = h.apply().await.unwrap();
    h.scheduler.finish_job(&job_name(JobType::Apply, &run.id), true);
    controller.reconcile_run(&run.id).await.unwrap();

    let destroy = h
        .deployer()
        .destroy(&h.resource.id, &DeployOptions::default())
        .await
        .unwrap();
    assert_eq!(destroy.run_type, RunType::Delete);
    assert!(h
        .scheduler
        .job_spec(&job_name(JobType::Destroy, &destroy.id))
        .is_some());
}

#[tokio::test]
async fn test_cancel_run() {
    let h = Harness::new(MockScheduler::new());
    let deployer = h.deployer();

    let run = h.apply().await.unwrap();
    let canceled = deployer.cancel(&run.id).await.unwrap();

    assert_eq!(canceled.status, RunStatus::Failed);
    assert_eq!(canceled.status_message, "canceled");
    assert!(h.scheduler.job(&job_name(JobType::Apply, &run.id)).is_none());
    assert!(h.scheduler.secret(&secret_name(&run.id)).is_none());

    let err = deployer.cancel(&run.id).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
}

#[tokio::test]
async fn test_clone_reuses_attributes() {
    let h = Harness::new(MockScheduler::new());
    let controller = h.controller();

    let mut first = h.apply().await.unwrap();
    first.computed_attributes.insert("replicas".into(), json!(3));
    h.store.update_run(&first).unwrap();
    h.scheduler.finish_job(&job_name(JobType::Apply, &first.id), true);
    controller.reconcile_run(&first.id).await.unwrap();

    let opts = DeployOptions {
        clone_from: Some(first.id.clone()),
    };
    let second = h.deployer().apply(&h.resource.id, &opts).await.unwrap();

    assert_eq!(second.computed_attributes["replicas"], json!(3));
    let main = String::from_utf8(second.input_configs["main.tf"].clone()).unwrap();
    assert!(main.contains("replicas = 3"));
}

#[tokio::test]
async fn test_dependency_outputs_from_other_resource() {
    let h = Harness::new(MockScheduler::new());

    let db = Resource::new("db", "p1", "e1", ModuleConfig::new("db", "./modules/db"));
    h.store.put_resource(db.clone());
    let mut db_run = Run::new(&db, RunType::Create);
    db_run.status = RunStatus::Succeeded;
    db_run.output = Some(state(&[]));
    h.store.put_run(db_run).unwrap();

    let web = Resource::new(
        "api",
        "p1",
        "e1",
        ModuleConfig::new("api", "./modules/api").with_attribute("db_host", json!("${res.db.endpoint}")),
    );
    h.store.put_resource(web.clone());

    let run = h
        .deployer()
        .apply(&web.id, &DeployOptions::default())
        .await
        .unwrap();
    let vars = String::from_utf8(run.input_configs["terraform.tfvars"].clone()).unwrap();
    assert!(vars.contains("10.0.0.5"));
}

#[tokio::test]
async fn test_stream_logs_waits_for_pod() {
    let h = Harness::new(MockScheduler::new().pods_pending_for(2));
    let controller = h.controller();

    let run = h.apply().await.unwrap();
    h.scheduler.set_logs(
        format!("{}-0", job_name(JobType::Apply, &run.id)),
        "Initializing...\nApply complete!\n",
    );

    let mut out = Vec::new();
    controller.stream_logs(&run.id, &mut out).await.unwrap();

    assert_eq!(String::from_utf8(out).unwrap(), "Initializing...\nApply complete!\n");
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(1); 2]);
}

#[tokio::test]
async fn test_stream_logs_times_out() {
    let h = Harness::new(MockScheduler::new().pods_pending_for(100));
    let controller = h.controller();
    let run = h.apply().await.unwrap();

    let mut out = Vec::new();
    let err = controller.stream_logs(&run.id, &mut out).await.unwrap_err();

    assert!(matches!(err, CoreError::Timeout(_)));
    assert!(out.is_empty());
    assert_eq!(h.clock.sleeps().len(), 5);
}

#[tokio::test]
async fn test_stream_logs_without_pods() {
    let h = Harness::new(MockScheduler::new());
    let controller = h.controller();

    let run = h.apply().await.unwrap();
    h.deployer().cancel(&run.id).await.unwrap();

    let mut out = Vec::new();
    controller.stream_logs(&run.id, &mut out).await.unwrap();
    assert!(out.is_empty());
}
