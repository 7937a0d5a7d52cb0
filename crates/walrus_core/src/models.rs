//! Persisted models.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walrus_config::{ModuleConfig, RequiredProvider};
use walrus_runner::JobType;

/// Run status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

/// What a run does to its resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    #[default]
    Create,
    Update,
    Delete,
}

impl RunType {
    /// Job executing runs of this type.
    pub fn job_type(&self) -> JobType {
        match self {
            RunType::Create | RunType::Update => JobType::Apply,
            RunType::Delete => JobType::Destroy,
        }
    }
}

/// A deployable unit: one module instantiated in an environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub environment_id: String,
    pub template_id: String,
    pub template_version: String,
    /// Module reference with the attributes the user set.
    pub module: ModuleConfig,
    /// Module variables declared write-only.
    #[serde(default)]
    pub sensitive_variables: BTreeSet<String>,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        project_id: impl Into<String>,
        environment_id: impl Into<String>,
        module: ModuleConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            project_id: project_id.into(),
            environment_id: environment_id.into(),
            template_id: String::new(),
            template_version: String::new(),
            module,
            sensitive_variables: BTreeSet::new(),
        }
    }
}

/// One execution of a resource's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub resource_id: String,
    pub project_id: String,
    pub environment_id: String,
    pub template_id: String,
    pub template_version: String,
    pub run_type: RunType,
    pub computed_attributes: BTreeMap<String, serde_json::Value>,
    /// Values of the variables the configuration references.
    pub variables: BTreeMap<String, String>,
    /// Providers the configuration required, kept for later destroys.
    pub previous_required_providers: Vec<RequiredProvider>,
    /// Compiled files keyed by file name.
    pub input_configs: BTreeMap<String, Vec<u8>>,
    /// State document reported by the engine.
    pub output: Option<Vec<u8>>,
    pub status: RunStatus,
    pub status_message: String,
    pub duration_secs: i64,
    pub create_time: DateTime<Utc>,
    /// Tail of the job logs.
    pub record: String,
}

impl Run {
    pub fn new(resource: &Resource, run_type: RunType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resource_id: resource.id.clone(),
            project_id: resource.project_id.clone(),
            environment_id: resource.environment_id.clone(),
            template_id: resource.template_id.clone(),
            template_version: resource.template_version.clone(),
            run_type,
            computed_attributes: resource.module.attributes.clone(),
            variables: BTreeMap::new(),
            previous_required_providers: Vec::new(),
            input_configs: BTreeMap::new(),
            output: None,
            status: RunStatus::Pending,
            status_message: String::new(),
            duration_secs: 0,
            create_time: Utc::now(),
            record: String::new(),
        }
    }

    pub fn job_type(&self) -> JobType {
        self.run_type.job_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_serde() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Succeeded).unwrap(),
            "\"succeeded\""
        );
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_run_inherits_resource_identity() {
        let resource = Resource::new("web", "p1", "e1", ModuleConfig::new("web", "./web"));
        let run = Run::new(&resource, RunType::Delete);

        assert_eq!(run.resource_id, resource.id);
        assert_eq!(run.environment_id, "e1");
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.job_type(), JobType::Destroy);
    }
}
