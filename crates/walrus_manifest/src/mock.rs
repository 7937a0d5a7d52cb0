//! Mock API client for testing.
//!
//! Serves objects from memory, answers with scripted status codes when
//! told to, and captures every call.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;

use crate::client::{ApiClient, Event, EventStream};
use crate::error::{check_status, ManifestResult};
use crate::object::ObjectScope;

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub group: String,
    pub scope: ObjectScope,
    /// Object names the call addressed.
    pub names: Vec<String>,
    pub body: Option<Value>,
}

type ObjectKey = (String, ObjectScope, String);
type WatchKey = (String, ObjectScope);

/// In-memory API server.
#[derive(Clone, Default)]
pub struct MockApiClient {
    objects: Arc<RwLock<BTreeMap<ObjectKey, Value>>>,
    /// Status codes answered before the default behaviour, per method.
    responses: Arc<RwLock<BTreeMap<String, VecDeque<u16>>>>,
    events: Arc<RwLock<BTreeMap<WatchKey, Vec<Event>>>>,
    /// Keep watches open after their scripted events.
    hold_watches: Arc<RwLock<bool>>,
    /// Methods whose calls never return.
    hung: Arc<RwLock<BTreeSet<String>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl MockApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object the server already has.
    pub fn with_object(self, group: &str, scope: ObjectScope, name: &str, value: Value) -> Self {
        self.objects
            .write()
            .insert((group.to_string(), scope, name.to_string()), value);
        self
    }

    /// Answer the next call of `method` with `status`.
    ///
    /// Success codes fall through to the default behaviour.
    pub fn respond_with(self, method: &str, status: u16) -> Self {
        self.responses
            .write()
            .entry(method.to_string())
            .or_default()
            .push_back(status);
        self
    }

    /// Events a watch of `group` in `scope` replays.
    pub fn with_events(self, group: &str, scope: ObjectScope, events: Vec<Event>) -> Self {
        self.events
            .write()
            .entry((group.to_string(), scope))
            .or_default()
            .extend(events);
        self
    }

    /// Keep watch streams open instead of ending after their events.
    pub fn hold_watches(self) -> Self {
        *self.hold_watches.write() = true;
        self
    }

    /// Make every call of `method` hang after it is recorded.
    pub fn hang(self, method: &str) -> Self {
        self.hung.write().insert(method.to_string());
        self
    }

    pub fn object(&self, group: &str, scope: &ObjectScope, name: &str) -> Option<Value> {
        self.objects
            .read()
            .get(&(group.to_string(), scope.clone(), name.to_string()))
            .cloned()
    }

    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    fn record_call(
        &self,
        method: &str,
        group: &str,
        scope: &ObjectScope,
        names: Vec<String>,
        body: Option<&Value>,
    ) -> ManifestResult<()> {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            group: group.to_string(),
            scope: scope.clone(),
            names,
            body: body.cloned(),
        });

        let scripted = self
            .responses
            .write()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(status) => check_status(status, format!("scripted {} response", method)),
            None => Ok(()),
        }
    }

    async fn stall(&self, method: &str) {
        let hung = self.hung.read().contains(method);
        if hung {
            futures::future::pending::<()>().await;
        }
    }

    fn is_preview(body: &Value) -> bool {
        body.get("preview").and_then(Value::as_bool).unwrap_or(false)
    }
}

#[async_trait]
impl ApiClient for MockApiClient {
    async fn get_object(
        &self,
        group: &str,
        scope: &ObjectScope,
        name: &str,
    ) -> ManifestResult<Option<Value>> {
        self.record_call("get_object", group, scope, vec![name.to_string()], None)?;
        Ok(self.object(group, scope, name))
    }

    async fn create_objects(&self, group: &str, scope: &ObjectScope, body: &Value) -> ManifestResult<()> {
        let items: Vec<Value> = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let names: Vec<String> = items
            .iter()
            .filter_map(|i| i.get("name").and_then(Value::as_str).map(str::to_string))
            .collect();
        self.record_call("create_objects", group, scope, names.clone(), Some(body))?;
        self.stall("create_objects").await;

        if !Self::is_preview(body) {
            let mut objects = self.objects.write();
            for (name, item) in names.into_iter().zip(items) {
                objects.insert((group.to_string(), scope.clone(), name), item);
            }
        }
        Ok(())
    }

    async fn patch_object(
        &self,
        group: &str,
        scope: &ObjectScope,
        name: &str,
        body: &Value,
    ) -> ManifestResult<()> {
        self.record_call("patch_object", group, scope, vec![name.to_string()], Some(body))?;
        self.stall("patch_object").await;
        if !Self::is_preview(body) {
            self.objects
                .write()
                .insert((group.to_string(), scope.clone(), name.to_string()), body.clone());
        }
        Ok(())
    }

    async fn delete_objects(&self, group: &str, scope: &ObjectScope, names: &[String]) -> ManifestResult<()> {
        self.record_call("delete_objects", group, scope, names.to_vec(), None)?;
        self.stall("delete_objects").await;
        let mut objects = self.objects.write();
        for name in names {
            objects.remove(&(group.to_string(), scope.clone(), name.clone()));
        }
        Ok(())
    }

    async fn watch(&self, group: &str, scope: &ObjectScope) -> ManifestResult<EventStream> {
        self.record_call("watch", group, scope, Vec::new(), None)?;
        let events: Vec<ManifestResult<Event>> = self
            .events
            .read()
            .get(&(group.to_string(), scope.clone()))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(Ok)
            .collect();

        let replay = stream::iter(events);
        if *self.hold_watches.read() {
            Ok(replay.chain(stream::pending()).boxed())
        } else {
            Ok(replay.boxed())
        }
    }
}
