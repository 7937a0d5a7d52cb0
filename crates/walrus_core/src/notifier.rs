//! Run status notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::CoreResult;
use crate::models::{Run, RunStatus};

/// Status change of a run as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub resource_id: String,
    pub status: RunStatus,
    pub message: String,
}

impl From<&Run> for RunEvent {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id.clone(),
            resource_id: run.resource_id.clone(),
            status: run.status,
            message: run.status_message.clone(),
        }
    }
}

/// Publishes run status changes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, run: &Run) -> CoreResult<()>;
}

/// Fans run events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<RunEvent>,
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, run: &Run) -> CoreResult<()> {
        // No subscribers is not an error.
        if self.tx.send(RunEvent::from(run)).is_err() {
            debug!("No subscribers for run {}", run.id);
        }
        Ok(())
    }
}
