//! Deployment job configuration and naming.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::JobSpec;

/// Label carrying the run a job or secret belongs to.
pub const RUN_LABEL: &str = "walrus.seal.io/resource-run-id";
/// Label carrying the job type.
pub const JOB_TYPE_LABEL: &str = "walrus.seal.io/job-type";

pub const DEFAULT_IMAGE: &str = "sealio/terraform-deployer:v0.1.4";
pub const DEFAULT_SECRET_MOUNT_PATH: &str = "/seal/secrets";
pub const DEFAULT_WORKDIR: &str = "/seal/deployment";
pub const DEFAULT_TTL_SECONDS: u64 = 900;

const MAIN_FILE: &str = "main.tf";
const VARS_FILE: &str = "terraform.tfvars";

/// Kind of deployment job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Apply,
    Destroy,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Apply => "apply",
            JobType::Destroy => "destroy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "apply" => Some(JobType::Apply),
            "destroy" => Some(JobType::Destroy),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the secret holding the files of a run.
pub fn secret_name(run_id: &str) -> String {
    format!("tf-secret-{}", run_id)
}

/// Name of the job executing a run.
pub fn job_name(job_type: JobType, run_id: &str) -> String {
    format!("tf-job-{}-{}", job_type, run_id)
}

/// Settings shared by every deployment job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Deployer image
    pub image: String,
    /// Where the run secret is mounted
    pub secret_mount_path: String,
    /// Working directory of the deployer
    pub workdir: String,
    pub backoff_limit: i32,
    pub ttl_seconds_after_finished: u64,
    /// Extra environment, e.g. proxy settings
    pub env: BTreeMap<String, String>,
    pub network_mode: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            secret_mount_path: DEFAULT_SECRET_MOUNT_PATH.to_string(),
            workdir: DEFAULT_WORKDIR.to_string(),
            backoff_limit: 0,
            ttl_seconds_after_finished: DEFAULT_TTL_SECONDS,
            env: BTreeMap::new(),
            network_mode: None,
        }
    }
}

impl JobConfig {
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network_mode = Some(network.into());
        self
    }

    /// Shell command the deployer runs.
    pub fn command(&self, job_type: JobType) -> Vec<String> {
        let script = format!(
            "cp {mount}/{main} {main} && terraform init -no-color && terraform {action} -auto-approve -no-color -var-file={mount}/{vars}",
            mount = self.secret_mount_path.trim_end_matches('/'),
            main = MAIN_FILE,
            vars = VARS_FILE,
            action = job_type,
        );
        vec!["/bin/sh".to_string(), "-c".to_string(), script]
    }

    /// Spec of the job executing a run.
    pub fn job_spec(&self, job_type: JobType, run_id: &str) -> JobSpec {
        let mut labels = BTreeMap::new();
        labels.insert(RUN_LABEL.to_string(), run_id.to_string());
        labels.insert(JOB_TYPE_LABEL.to_string(), job_type.to_string());

        JobSpec {
            name: job_name(job_type, run_id),
            labels,
            image: self.image.clone(),
            command: self.command(job_type),
            workdir: Some(self.workdir.clone()),
            env: self.env.clone(),
            secret_name: secret_name(run_id),
            secret_mount_path: self.secret_mount_path.clone(),
            backoff_limit: self.backoff_limit,
            ttl_seconds_after_finished: self.ttl_seconds_after_finished,
            network_mode: self.network_mode.clone(),
        }
    }
}
