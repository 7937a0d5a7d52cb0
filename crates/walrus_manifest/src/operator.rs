//! Apply, preview and delete object sets against the server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use walrus_core::Clock;

use crate::client::ApiClient;
use crate::config::BackoffConfig;
use crate::error::{aggregate, ManifestError};
use crate::object::{Object, ObjectScope, ObjectSet, ObjectStatus, GROUP_SEQUENCE};

/// What an operator does to a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Apply,
    Preview,
    Delete,
}

/// Outcome of an operation, split by what happened to each object.
#[derive(Debug)]
pub struct OperateResult {
    pub operation: Operation,
    pub success: ObjectSet,
    pub failed: ObjectSet,
    pub not_found: ObjectSet,
    pub unchanged: ObjectSet,
    /// Last error, if the operation did not complete.
    pub error: Option<ManifestError>,
}

impl OperateResult {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            success: ObjectSet::new(),
            failed: ObjectSet::new(),
            not_found: ObjectSet::new(),
            unchanged: ObjectSet::new(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed.is_empty()
    }

    /// One line per object. With `wait`, successes read as in progress.
    pub fn messages(&self, wait: bool) -> Vec<String> {
        let line = |obj: &Object, msg: &str| format!("{} {}", obj.display_name(), msg);
        let mut lines = Vec::new();

        match self.operation {
            Operation::Apply => {
                for obj in self.not_found.all() {
                    lines.push(line(&obj, "not found"));
                }
                for obj in self.unchanged.all() {
                    lines.push(line(&obj, "unchanged"));
                }
                for obj in self.success.all() {
                    let msg = match (obj.status, wait) {
                        (ObjectStatus::Changed, false) => "patched",
                        (ObjectStatus::Changed, true) => "patching",
                        (_, false) => "created",
                        (_, true) => "creating",
                    };
                    lines.push(line(&obj, msg));
                }
                for obj in self.failed.all() {
                    lines.push(line(&obj, "apply failed"));
                }
            }
            Operation::Preview => {
                let msg = if wait {
                    "preview generating"
                } else {
                    "preview generated"
                };
                for obj in self.success.all() {
                    lines.push(line(&obj, msg));
                }
                for obj in self.failed.all() {
                    lines.push(line(&obj, "preview generation failed"));
                }
            }
            Operation::Delete => {
                let msg = if wait { "deleting" } else { "deleted" };
                for obj in self.success.all() {
                    lines.push(line(&obj, msg));
                }
                for obj in self.failed.all() {
                    lines.push(line(&obj, "delete failed"));
                }
                for obj in self.not_found.all() {
                    lines.push(line(&obj, "not found"));
                }
            }
        }
        lines
    }
}

/// Drives object sets through the API with retries.
pub struct Operator {
    client: Arc<dyn ApiClient>,
    clock: Arc<dyn Clock>,
    backoff: BackoffConfig,
    timeout: Option<Duration>,
}

impl Operator {
    pub fn new(client: Arc<dyn ApiClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            backoff: BackoffConfig::default(),
            timeout: None,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Give up after `timeout`, returning what was settled so far.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Create missing objects and patch changed ones.
    pub async fn apply(&self, set: ObjectSet) -> OperateResult {
        self.operate(Operation::Apply, set).await
    }

    /// Ask the server for a preview of applying the set.
    pub async fn preview(&self, set: ObjectSet) -> OperateResult {
        self.operate(Operation::Preview, set).await
    }

    pub async fn delete(&self, set: ObjectSet) -> OperateResult {
        self.operate(Operation::Delete, set).await
    }

    async fn operate(&self, op: Operation, set: ObjectSet) -> OperateResult {
        let mut result = OperateResult::new(op);
        let mut pending = set;

        let run = self.retry(op, &mut pending, &mut result);
        let error = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(error) => error,
                Err(_) => Some(ManifestError::Timeout(format!(
                    "{:?} did not finish within {:?}",
                    op, timeout
                ))),
            },
            None => run.await,
        };

        result.failed = pending;
        result.error = error;
        info!(
            "{:?}: {} succeeded, {} failed, {} unchanged, {} not found",
            op,
            result.success.len(),
            result.failed.len(),
            result.unchanged.len(),
            result.not_found.len()
        );
        result
    }

    /// Repeat rounds over the still-failed objects while errors are retryable.
    async fn retry(
        &self,
        op: Operation,
        pending: &mut ObjectSet,
        result: &mut OperateResult,
    ) -> Option<ManifestError> {
        let mut delays = self.backoff.delays().into_iter();
        loop {
            if pending.is_empty() {
                return None;
            }

            let Some(err) = self.round(op, pending, result).await else {
                *pending = ObjectSet::new();
                return None;
            };

            if !err.is_retryable() {
                return Some(err);
            }
            match delays.next() {
                Some(delay) => {
                    warn!("Retrying {} objects in {:?}: {}", pending.len(), delay, err);
                    self.clock.sleep(delay).await;
                }
                None => return Some(err),
            }
        }
    }

    /// One pass over `pending`.
    ///
    /// Objects move from `pending` into `result` as soon as their batch
    /// returns, so a round cut short by the deadline keeps what it settled.
    async fn round(
        &self,
        op: Operation,
        pending: &mut ObjectSet,
        result: &mut OperateResult,
    ) -> Option<ManifestError> {
        let set = pending.clone();

        let groups: Vec<&str> = match op {
            Operation::Delete => GROUP_SEQUENCE.iter().rev().copied().collect(),
            _ => GROUP_SEQUENCE.to_vec(),
        };

        for group in groups {
            let objects: Vec<Object> = set.by_group(group).into_values().flatten().collect();
            if objects.is_empty() {
                continue;
            }
            if let Err(e) = self.round_group(op, group, objects, pending, result).await {
                return Some(e);
            }
        }
        None
    }

    async fn round_group(
        &self,
        op: Operation,
        group: &str,
        objects: Vec<Object>,
        pending: &mut ObjectSet,
        r: &mut OperateResult,
    ) -> Result<(), ManifestError> {
        let fetched = self.get_objects(group, objects, op == Operation::Apply).await?;
        let (missing, existing): (Vec<Object>, Vec<Object>) = fetched
            .into_iter()
            .partition(|o| o.status == ObjectStatus::NotFound);

        match op {
            Operation::Apply => {
                let (changed, unchanged): (Vec<Object>, Vec<Object>) = existing
                    .into_iter()
                    .partition(|o| o.status == ObjectStatus::Changed);
                pending.remove(&unchanged);
                r.unchanged.add(unchanged);

                settle(pending, r, self.patch_objects(group, changed, None).await)?;
                settle(pending, r, self.create_objects(group, missing, None).await)?;
            }
            Operation::Preview => {
                let mut extra = Map::new();
                extra.insert("preview".to_string(), Value::Bool(true));

                settle(pending, r, self.patch_objects(group, existing, Some(&extra)).await)?;
                settle(pending, r, self.create_objects(group, missing, Some(&extra)).await)?;
            }
            Operation::Delete => {
                pending.remove(&missing);
                r.not_found.add(missing);

                settle(pending, r, self.delete_objects(group, existing).await)?;
            }
        }
        Ok(())
    }

    /// Fetch objects concurrently, setting their id and status.
    async fn get_objects(
        &self,
        group: &str,
        objects: Vec<Object>,
        detect_change: bool,
    ) -> Result<Vec<Object>, ManifestError> {
        let results = join_all(objects.into_iter().map(|mut obj| async move {
            let remote = self.client.get_object(group, &obj.scope, &obj.name).await?;
            let Some(remote) = remote else {
                obj.status = ObjectStatus::NotFound;
                return Ok(obj);
            };

            if let Some(id) = remote.get("id").and_then(Value::as_str) {
                obj.id = id.to_string();
            }
            obj.status = ObjectStatus::Unchanged;
            if detect_change {
                let mut merged = remote.clone();
                merge_patch(&mut merged, &Value::Object(obj.value.clone()));
                if merged != remote {
                    obj.status = ObjectStatus::Changed;
                }
            }
            debug!("{} is {:?}", obj.display_name(), obj.status);
            Ok(obj)
        }))
        .await;

        let mut fetched = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(obj) => fetched.push(obj),
                Err(e) => errors.push(e),
            }
        }
        match aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(fetched),
        }
    }

    async fn patch_objects(
        &self,
        group: &str,
        objects: Vec<Object>,
        extra: Option<&Map<String, Value>>,
    ) -> Batch {
        let results = join_all(objects.into_iter().map(|obj| async move {
            let body = with_extra(obj.value.clone(), extra);
            let result = self
                .client
                .patch_object(group, &obj.scope, &obj.name, &body)
                .await;
            (vec![obj], result)
        }))
        .await;
        Batch::collect(results)
    }

    /// One batch create per scope.
    async fn create_objects(
        &self,
        group: &str,
        objects: Vec<Object>,
        extra: Option<&Map<String, Value>>,
    ) -> Batch {
        let results = join_all(by_scope(objects).into_iter().map(|(scope, objs)| async move {
            let items: Vec<Value> = objs.iter().map(|o| Value::Object(o.value.clone())).collect();
            let mut body = Map::new();
            body.insert("items".to_string(), Value::Array(items));
            let body = with_extra(body, extra);

            let result = self.client.create_objects(group, &scope, &body).await;
            (objs, result)
        }))
        .await;
        Batch::collect(results)
    }

    /// One batch delete per scope.
    async fn delete_objects(&self, group: &str, objects: Vec<Object>) -> Batch {
        let results = join_all(by_scope(objects).into_iter().map(|(scope, objs)| async move {
            let names: Vec<String> = objs.iter().map(|o| o.name.clone()).collect();
            let result = self.client.delete_objects(group, &scope, &names).await;
            (objs, result)
        }))
        .await;
        Batch::collect(results)
    }
}

/// Objects that went through, and the combined error of those that did not.
struct Batch {
    succeeded: Vec<Object>,
    error: Option<ManifestError>,
}

impl Batch {
    fn collect(results: Vec<(Vec<Object>, Result<(), ManifestError>)>) -> Self {
        let mut succeeded = Vec::new();
        let mut errors = Vec::new();
        for (objs, result) in results {
            match result {
                Ok(()) => succeeded.extend(objs),
                Err(e) => {
                    for obj in &objs {
                        warn!("{} failed: {}", obj.display_name(), e);
                    }
                    errors.push(e);
                }
            }
        }
        Self {
            succeeded,
            error: aggregate(errors),
        }
    }
}

/// Move the objects of a batch that went through out of `pending`; its
/// error ends the round.
fn settle(pending: &mut ObjectSet, r: &mut OperateResult, batch: Batch) -> Result<(), ManifestError> {
    pending.remove(&batch.succeeded);
    r.success.add(batch.succeeded);
    match batch.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn by_scope(objects: Vec<Object>) -> BTreeMap<ObjectScope, Vec<Object>> {
    let mut grouped: BTreeMap<ObjectScope, Vec<Object>> = BTreeMap::new();
    for obj in objects {
        grouped.entry(obj.scope.clone()).or_default().push(obj);
    }
    grouped
}

fn with_extra(mut body: Map<String, Value>, extra: Option<&Map<String, Value>>) -> Value {
    if let Some(extra) = extra {
        for (k, v) in extra {
            body.insert(k.clone(), v.clone());
        }
    }
    Value::Object(body)
}

/// Apply a JSON merge patch (RFC 7386) to `target`.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        for (key, value) in patch {
            if value.is_null() {
                map.remove(key);
            } else {
                merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [1]});
        merge_patch(&mut target, &json!({"b": {"c": null, "x": 1}, "e": [2], "f": "new"}));
        assert_eq!(target, json!({"a": 1, "b": {"d": 3, "x": 1}, "e": [2], "f": "new"}));

        let mut scalar = json!("old");
        merge_patch(&mut scalar, &json!({"k": "v"}));
        assert_eq!(scalar, json!({"k": "v"}));
    }

    #[test]
    fn test_messages() {
        let scope = ObjectScope::new("p", "dev");
        let mut created = Object::new("resources", scope.clone(), "web");
        created.status = ObjectStatus::NotFound;
        let mut patched = Object::new("resources", scope.clone(), "db");
        patched.status = ObjectStatus::Changed;

        let mut result = OperateResult::new(Operation::Apply);
        result.success.add([created, patched]);
        result.failed.add([Object::new("resources", scope, "cache")]);

        assert_eq!(
            result.messages(false),
            vec![
                "resource p/dev/db patched",
                "resource p/dev/web created",
                "resource p/dev/cache apply failed",
            ]
        );
        assert_eq!(result.messages(true)[1], "resource p/dev/web creating");
    }
}
