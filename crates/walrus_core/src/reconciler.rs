//! Reconcile parsed instances into the persisted inventory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{info, warn};
use walrus_state::{fingerprint, ResourceInstance};

use crate::error::{CoreResult, MultiError};
use crate::labeler::Labeler;
use crate::models::Resource;
use crate::store::{Store, Tx};

/// What a reconciliation changed.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: Vec<ResourceInstance>,
    pub kept: usize,
    pub deleted: usize,
    /// Failures of the best-effort labeling after commit.
    pub label_errors: Option<MultiError>,
}

/// Keeps a resource's instances equal to what its last state reported.
pub struct ResourceReconciler {
    store: Arc<dyn Store>,
    labeler: Arc<dyn Labeler>,
}

impl ResourceReconciler {
    pub fn new(store: Arc<dyn Store>, labeler: Arc<dyn Labeler>) -> Self {
        Self { store, labeler }
    }

    /// Replace the instances of `resource` with `incoming`.
    ///
    /// Instances are matched by fingerprint: matching rows are kept
    /// untouched, missing rows are deleted and unknown ones inserted, all in
    /// one transaction. Labeling the created instances happens afterwards and
    /// never undoes the commit.
    pub async fn reconcile(
        &self,
        resource: &Resource,
        incoming: Vec<ResourceInstance>,
    ) -> CoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        self.store.transaction(&mut |tx: &mut dyn Tx| {
            let existing: BTreeMap<String, String> = tx
                .list_instances(&resource.id)
                .into_iter()
                .map(|i| (fingerprint(&i), i.id))
                .collect();

            let mut keep = BTreeSet::new();
            let mut seen = BTreeSet::new();
            let mut new = Vec::new();
            for mut instance in incoming.iter().cloned() {
                instance.resource_id = resource.id.clone();
                instance.project_id = resource.project_id.clone();
                instance.environment_id = resource.environment_id.clone();

                let fp = fingerprint(&instance);
                if !seen.insert(fp.clone()) {
                    continue;
                }
                match existing.get(&fp) {
                    Some(id) => {
                        keep.insert(id.clone());
                    }
                    None => new.push(instance),
                }
            }

            let stale: BTreeSet<String> = existing
                .values()
                .filter(|id| !keep.contains(*id))
                .cloned()
                .collect();

            report.deleted = tx.delete_instances(&stale)?;
            report.kept = keep.len();
            report.created = tx.insert_instances(new)?;
            Ok(())
        })?;

        info!(
            "Reconciled resource {}: {} created, {} kept, {} deleted",
            resource.name,
            report.created.len(),
            report.kept,
            report.deleted
        );

        let errors = self.label(&report.created).await;
        if !errors.is_empty() {
            warn!("Failed to label instances of {}: {}", resource.name, errors);
            report.label_errors = Some(errors);
        }

        Ok(report)
    }

    async fn label(&self, created: &[ResourceInstance]) -> MultiError {
        let mut by_connector: BTreeMap<&str, Vec<ResourceInstance>> = BTreeMap::new();
        for instance in created {
            by_connector
                .entry(instance.connector_id.as_str())
                .or_default()
                .push(instance.clone());
        }

        let mut errors = MultiError::new();
        for (connector_id, instances) in by_connector {
            if let Err(e) = self.labeler.label(connector_id, &instances).await {
                errors.push(format!("connector {}: {}", connector_id, e));
            }
        }
        errors
    }
}
