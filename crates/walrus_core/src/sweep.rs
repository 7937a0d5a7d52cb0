//! Bucketed background sweeps.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{CoreResult, MultiError};
use crate::labeler::Labeler;
use crate::store::Store;

/// Process `items` in buckets of `bucket_size`, buckets running concurrently.
///
/// A failing bucket does not stop the others; every failure is collected.
pub async fn sweep_in_buckets<T, F, Fut>(
    items: Vec<T>,
    bucket_size: usize,
    f: F,
) -> Result<(), MultiError>
where
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = CoreResult<()>>,
{
    let bucket_size = bucket_size.max(1);
    let mut buckets = Vec::new();
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        buckets.push(items.by_ref().take(bucket_size).collect::<Vec<T>>());
    }

    debug!("Sweeping {} buckets", buckets.len());
    let results = join_all(buckets.into_iter().map(&f)).await;

    let mut errors = MultiError::new();
    for err in results.into_iter().filter_map(Result::err) {
        errors.push(err);
    }
    errors.into_result()
}

/// Refreshes the observed status of a resource's instances.
pub struct ResourceStatusSyncer {
    store: Arc<dyn Store>,
    labeler: Arc<dyn Labeler>,
    bucket_size: usize,
}

impl ResourceStatusSyncer {
    pub fn new(store: Arc<dyn Store>, labeler: Arc<dyn Labeler>) -> Self {
        Self {
            store,
            labeler,
            bucket_size: 10,
        }
    }

    pub fn with_bucket_size(mut self, size: usize) -> Self {
        self.bucket_size = size;
        self
    }

    pub async fn sync(&self, resource_id: &str) -> Result<(), MultiError> {
        let instances = self.store.list_instances(resource_id);

        let result = sweep_in_buckets(instances, self.bucket_size, |bucket| async move {
            let mut errors = MultiError::new();
            for instance in bucket {
                let status = match self.labeler.status(&instance).await {
                    Ok(s) => s,
                    Err(e) => {
                        errors.push(format!("{}: {}", instance.fingerprint(), e));
                        continue;
                    }
                };
                if let Err(e) = self.store.update_instance_status(&instance.id, status) {
                    errors.push(format!("{}: {}", instance.fingerprint(), e));
                }
            }
            errors.into_result().map_err(Into::into)
        })
        .await;

        if let Err(e) = &result {
            warn!("Status sync of resource {} failed: {}", resource_id, e);
        }
        result
    }
}
