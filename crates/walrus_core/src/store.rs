//! Persistence boundary.
//!
//! [`Store`] is what the controllers read and write. Writes that must be
//! atomic go through [`Store::transaction`], which hands out a [`Tx`] whose
//! changes are either all committed or all discarded.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;
use walrus_config::{Connector, VariableValue};
use walrus_state::{InstanceStatus, ResourceInstance};

use crate::error::{CoreError, CoreResult};
use crate::models::{Resource, Run};

/// Operations available inside a transaction.
pub trait Tx {
    fn get_run(&self, id: &str) -> Option<Run>;

    /// Most recently created run of a resource.
    fn latest_run(&self, resource_id: &str) -> Option<Run>;

    fn insert_run(&mut self, run: Run) -> CoreResult<Run>;

    fn list_instances(&self, resource_id: &str) -> Vec<ResourceInstance>;

    fn delete_instances(&mut self, ids: &BTreeSet<String>) -> CoreResult<usize>;

    /// Insert instances, assigning ids and creation times.
    fn insert_instances(
        &mut self,
        instances: Vec<ResourceInstance>,
    ) -> CoreResult<Vec<ResourceInstance>>;
}

/// Persisted resources, runs and instances.
pub trait Store: Send + Sync {
    /// Run `f` atomically; any error discards its changes.
    fn transaction(&self, f: &mut dyn FnMut(&mut dyn Tx) -> CoreResult<()>) -> CoreResult<()>;

    fn get_resource(&self, id: &str) -> CoreResult<Resource>;

    fn list_resources(&self, project_id: &str, environment_id: &str) -> Vec<Resource>;

    fn list_connectors(&self, project_id: &str, environment_id: &str) -> Vec<Connector>;

    fn list_variables(&self, project_id: &str, environment_id: &str)
        -> BTreeMap<String, VariableValue>;

    fn get_run(&self, id: &str) -> CoreResult<Run>;

    fn latest_run(&self, resource_id: &str) -> Option<Run>;

    fn list_runs(&self, resource_id: &str) -> Vec<Run>;

    fn update_run(&self, run: &Run) -> CoreResult<()>;

    fn list_instances(&self, resource_id: &str) -> Vec<ResourceInstance>;

    fn update_instance_status(&self, id: &str, status: InstanceStatus) -> CoreResult<()>;
}

type EnvKey = (String, String);

#[derive(Debug, Clone, Default)]
struct StoreData {
    resources: BTreeMap<String, Resource>,
    connectors: BTreeMap<EnvKey, Vec<Connector>>,
    variables: BTreeMap<EnvKey, BTreeMap<String, VariableValue>>,
    /// Runs in creation order.
    runs: Vec<Run>,
    instances: BTreeMap<String, ResourceInstance>,
}

impl Tx for StoreData {
    fn get_run(&self, id: &str) -> Option<Run> {
        self.runs.iter().find(|r| r.id == id).cloned()
    }

    fn latest_run(&self, resource_id: &str) -> Option<Run> {
        self.runs
            .iter()
            .rev()
            .find(|r| r.resource_id == resource_id)
            .cloned()
    }

    fn insert_run(&mut self, run: Run) -> CoreResult<Run> {
        if self.runs.iter().any(|r| r.id == run.id) {
            return Err(CoreError::Store(format!("duplicate run id {}", run.id)));
        }
        self.runs.push(run.clone());
        Ok(run)
    }

    fn list_instances(&self, resource_id: &str) -> Vec<ResourceInstance> {
        self.instances
            .values()
            .filter(|i| i.resource_id == resource_id)
            .cloned()
            .collect()
    }

    fn delete_instances(&mut self, ids: &BTreeSet<String>) -> CoreResult<usize> {
        let before = self.instances.len();
        self.instances.retain(|id, _| !ids.contains(id));
        Ok(before - self.instances.len())
    }

    fn insert_instances(
        &mut self,
        instances: Vec<ResourceInstance>,
    ) -> CoreResult<Vec<ResourceInstance>> {
        let mut inserted = Vec::with_capacity(instances.len());
        for mut instance in instances {
            if instance.resource_id.is_empty()
                || instance.connector_id.is_empty()
                || instance.resource_type.is_empty()
                || instance.name.is_empty()
            {
                return Err(CoreError::Store(format!(
                    "instance {} violates not-null constraint",
                    instance.fingerprint()
                )));
            }

            let fingerprint = instance.fingerprint();
            let duplicate = self
                .instances
                .values()
                .any(|i| i.resource_id == instance.resource_id && i.fingerprint() == fingerprint);
            if duplicate {
                return Err(CoreError::Store(format!(
                    "instance {} already exists",
                    fingerprint
                )));
            }

            instance.id = Uuid::new_v4().to_string();
            instance.create_time = Some(Utc::now());
            self.instances.insert(instance.id.clone(), instance.clone());
            inserted.push(instance);
        }
        Ok(inserted)
    }
}

/// [`Store`] keeping everything in memory.
///
/// Transactions run on a copy of the data under the write lock, so they
/// are serialized and a failed transaction leaves no trace.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_resource(&self, resource: Resource) {
        self.data
            .write()
            .resources
            .insert(resource.id.clone(), resource);
    }

    pub fn put_connector(&self, project_id: &str, environment_id: &str, connector: Connector) {
        let mut data = self.data.write();
        let connectors = data
            .connectors
            .entry((project_id.to_string(), environment_id.to_string()))
            .or_default();
        connectors.retain(|c| c.id != connector.id);
        connectors.push(connector);
    }

    pub fn put_variable(
        &self,
        project_id: &str,
        environment_id: &str,
        name: impl Into<String>,
        value: VariableValue,
    ) {
        self.data
            .write()
            .variables
            .entry((project_id.to_string(), environment_id.to_string()))
            .or_default()
            .insert(name.into(), value);
    }

    /// Insert a run outside of a transaction.
    pub fn put_run(&self, run: Run) -> CoreResult<Run> {
        self.data.write().insert_run(run)
    }
}

impl Store for MemoryStore {
    fn transaction(&self, f: &mut dyn FnMut(&mut dyn Tx) -> CoreResult<()>) -> CoreResult<()> {
        let mut data = self.data.write();
        let mut tx = data.clone();
        match f(&mut tx) {
            Ok(()) => {
                *data = tx;
                Ok(())
            }
            Err(e) => {
                debug!("Rolled back transaction: {}", e);
                Err(e)
            }
        }
    }

    fn get_resource(&self, id: &str) -> CoreResult<Resource> {
        self.data
            .read()
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::ResourceNotFound(id.to_string()))
    }

    fn list_resources(&self, project_id: &str, environment_id: &str) -> Vec<Resource> {
        self.data
            .read()
            .resources
            .values()
            .filter(|r| r.project_id == project_id && r.environment_id == environment_id)
            .cloned()
            .collect()
    }

    fn list_connectors(&self, project_id: &str, environment_id: &str) -> Vec<Connector> {
        self.data
            .read()
            .connectors
            .get(&(project_id.to_string(), environment_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn list_variables(
        &self,
        project_id: &str,
        environment_id: &str,
    ) -> BTreeMap<String, VariableValue> {
        self.data
            .read()
            .variables
            .get(&(project_id.to_string(), environment_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn get_run(&self, id: &str) -> CoreResult<Run> {
        self.data
            .read()
            .get_run(id)
            .ok_or_else(|| CoreError::RunNotFound(id.to_string()))
    }

    fn latest_run(&self, resource_id: &str) -> Option<Run> {
        self.data.read().latest_run(resource_id)
    }

    fn list_runs(&self, resource_id: &str) -> Vec<Run> {
        self.data
            .read()
            .runs
            .iter()
            .filter(|r| r.resource_id == resource_id)
            .cloned()
            .collect()
    }

    fn update_run(&self, run: &Run) -> CoreResult<()> {
        let mut data = self.data.write();
        let existing = data
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or_else(|| CoreError::RunNotFound(run.id.clone()))?;
        *existing = run.clone();
        Ok(())
    }

    fn list_instances(&self, resource_id: &str) -> Vec<ResourceInstance> {
        self.data.read().list_instances(resource_id)
    }

    fn update_instance_status(&self, id: &str, status: InstanceStatus) -> CoreResult<()> {
        let mut data = self.data.write();
        let instance = data
            .instances
            .get_mut(id)
            .ok_or_else(|| CoreError::Store(format!("instance {} not found", id)))?;
        instance.status = status;
        Ok(())
    }
}
