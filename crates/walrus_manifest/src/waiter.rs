//! Wait for objects to reach a condition by watching the server.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::debug;

use crate::client::{ApiClient, EventItem};
use crate::error::{ManifestError, ManifestResult};
use crate::object::{singular, Object, ObjectScope, ObjectSet, GROUP_RESOURCES};

const STATUS_READY: &str = "Ready";
const EVENT_DELETE: &str = "delete";

/// When a watched object counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// Summary status is ready, or the status reports an error.
    StatusReadyOrError,
    /// A delete event was seen.
    Delete,
}

impl WaitCondition {
    /// Whether the event satisfies the condition, and the line describing it.
    fn check(&self, event_type: &str, item: &EventItem, group: &str, name: &str) -> (bool, String) {
        let in_status = || {
            format!(
                "{} {} is in status: {}",
                singular(group),
                name,
                item.status.summary_status
            )
        };
        match self {
            WaitCondition::StatusReadyOrError => (
                item.status.summary_status == STATUS_READY || item.status.error,
                in_status(),
            ),
            WaitCondition::Delete if event_type == EVENT_DELETE => {
                (true, format!("{} {} is deleted", singular(group), name))
            }
            WaitCondition::Delete => (false, in_status()),
        }
    }
}

type Printer = Arc<dyn Fn(&str) + Send + Sync>;

/// Watches object sets until every object meets its group's condition.
pub struct Waiter {
    client: Arc<dyn ApiClient>,
    conditions: BTreeMap<String, WaitCondition>,
    timeout: Duration,
    printer: Printer,
}

impl Waiter {
    pub fn new(client: Arc<dyn ApiClient>, timeout: Duration) -> Self {
        Self {
            client,
            conditions: BTreeMap::new(),
            timeout,
            printer: Arc::new(|line| println!("{}", line)),
        }
    }

    /// Wait for resources to become ready or fail.
    pub fn for_status(client: Arc<dyn ApiClient>, timeout: Duration) -> Self {
        Self::new(client, timeout).with_condition(GROUP_RESOURCES, WaitCondition::StatusReadyOrError)
    }

    /// Wait for resources to be deleted.
    pub fn for_delete(client: Arc<dyn ApiClient>, timeout: Duration) -> Self {
        Self::new(client, timeout).with_condition(GROUP_RESOURCES, WaitCondition::Delete)
    }

    pub fn with_condition(mut self, group: impl Into<String>, condition: WaitCondition) -> Self {
        self.conditions.insert(group.into(), condition);
        self
    }

    /// Where status lines go instead of stdout.
    pub fn with_printer(mut self, printer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.printer = Arc::new(printer);
        self
    }

    /// Watch `set` until every object not in `finished` meets its condition.
    ///
    /// A status line is printed only when it differs from the last one
    /// printed for the same object during this call.
    pub async fn wait(&self, set: &ObjectSet, finished: &ObjectSet) -> ManifestResult<bool> {
        let cache: Mutex<HashMap<String, String>> = Mutex::new(HashMap::new());

        let mut watches = Vec::new();
        for (group, condition) in &self.conditions {
            for (scope, objects) in set.by_group(group) {
                let objects: Vec<Object> = objects.into_iter().filter(|o| !finished.contains(o)).collect();
                if objects.is_empty() {
                    continue;
                }
                watches.push(self.watch_scope(group, *condition, scope, objects, &cache));
            }
        }

        let outcome = tokio::time::timeout(self.timeout, join_all(watches))
            .await
            .map_err(|_| ManifestError::Timeout(format!("objects not done within {:?}", self.timeout)))?;
        for result in outcome {
            result?;
        }
        Ok(true)
    }

    async fn watch_scope(
        &self,
        group: &str,
        condition: WaitCondition,
        scope: ObjectScope,
        objects: Vec<Object>,
        cache: &Mutex<HashMap<String, String>>,
    ) -> ManifestResult<()> {
        let names: BTreeSet<String> = objects.iter().map(|o| o.name.clone()).collect();
        let id_names: HashMap<String, String> = objects
            .iter()
            .filter(|o| !o.id.is_empty())
            .map(|o| (o.id.clone(), o.name.clone()))
            .collect();
        let mut done = BTreeSet::new();

        let mut events = self.client.watch(group, &scope).await?;
        while let Some(event) = events.next().await {
            let event = event?;
            for item in &event.items {
                let name = if item.name.is_empty() {
                    id_names.get(&item.id).cloned().unwrap_or_default()
                } else {
                    item.name.clone()
                };
                let scoped = scope.scoped_name(&name);
                debug!(
                    "Received {} event: {} {} {}",
                    event.event_type,
                    singular(group),
                    scoped,
                    item.status.summary_status
                );
                if !names.contains(&name) || done.contains(&name) {
                    continue;
                }

                let (met, line) = condition.check(&event.event_type, item, group, &scoped);
                self.print_once(cache, format!("{}/{}", group, scoped), line);
                if met {
                    done.insert(name);
                }
            }

            if done == names {
                return Ok(());
            }
        }

        Err(ManifestError::Watch(format!(
            "watch of {} in {} ended with {} of {} objects done",
            group,
            scope,
            done.len(),
            names.len()
        )))
    }

    fn print_once(&self, cache: &Mutex<HashMap<String, String>>, key: String, line: String) {
        let mut cache = cache.lock();
        if cache.get(&key) != Some(&line) {
            (self.printer)(&line);
            cache.insert(key, line);
        }
    }
}
