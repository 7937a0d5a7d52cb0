//! Callbacks into the platforms behind connectors.

use async_trait::async_trait;
use walrus_state::{InstanceStatus, ResourceInstance};

use crate::error::CoreResult;

/// Marks discovered instances on their platform and reads their status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Labeler: Send + Sync {
    /// Label instances that all belong to one connector.
    async fn label(&self, connector_id: &str, instances: &[ResourceInstance]) -> CoreResult<()>;

    /// Observed status of one instance.
    async fn status(&self, instance: &ResourceInstance) -> CoreResult<InstanceStatus>;
}

/// Labeler for deployments without platform access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLabeler;

#[async_trait]
impl Labeler for NoopLabeler {
    async fn label(&self, _connector_id: &str, _instances: &[ResourceInstance]) -> CoreResult<()> {
        Ok(())
    }

    async fn status(&self, instance: &ResourceInstance) -> CoreResult<InstanceStatus> {
        Ok(instance.status.clone())
    }
}
