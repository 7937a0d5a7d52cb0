//! Declared objects and sets of them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Group of resource objects.
pub const GROUP_RESOURCES: &str = "resources";

/// Groups in the order they are applied. Deletes run in reverse.
pub const GROUP_SEQUENCE: &[&str] = &[GROUP_RESOURCES];

/// Singular form of a group name, used in messages.
pub fn singular(group: &str) -> &str {
    group.strip_suffix('s').unwrap_or(group)
}

/// Project and environment an object lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectScope {
    pub project: String,
    pub environment: String,
}

impl ObjectScope {
    pub fn new(project: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
        }
    }

    /// Name qualified by this scope.
    pub fn scoped_name(&self, name: &str) -> String {
        format!("{}/{}/{}", self.project, self.environment, name)
    }
}

impl fmt::Display for ObjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.environment)
    }
}

/// How a declared object compares to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectStatus {
    #[default]
    NotFound,
    Unchanged,
    Changed,
}

/// One declared object.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub group: String,
    pub scope: ObjectScope,
    /// Server id, known once the object was fetched.
    pub id: String,
    pub name: String,
    pub status: ObjectStatus,
    /// Request body.
    pub value: Map<String, Value>,
}

impl Object {
    pub fn new(group: impl Into<String>, scope: ObjectScope, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut value = Map::new();
        value.insert("name".to_string(), Value::String(name.clone()));
        Self {
            group: group.into(),
            scope,
            id: String::new(),
            name,
            status: ObjectStatus::NotFound,
            value,
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.value.insert(key.into(), value);
        self
    }

    pub fn scoped_name(&self) -> String {
        self.scope.scoped_name(&self.name)
    }

    /// `<singular group> <scoped name>`, the subject of every message.
    pub fn display_name(&self) -> String {
        format!("{} {}", singular(&self.group), self.scoped_name())
    }
}

type ByScope = BTreeMap<ObjectScope, BTreeMap<String, Object>>;

/// Objects keyed by group, scope and name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSet {
    groups: BTreeMap<String, ByScope>,
}

impl ObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add objects, replacing any with the same key.
    pub fn add(&mut self, objects: impl IntoIterator<Item = Object>) {
        for obj in objects {
            self.groups
                .entry(obj.group.clone())
                .or_default()
                .entry(obj.scope.clone())
                .or_default()
                .insert(obj.name.clone(), obj);
        }
    }

    pub fn remove<'a>(&mut self, objects: impl IntoIterator<Item = &'a Object>) {
        for obj in objects {
            let Some(scopes) = self.groups.get_mut(&obj.group) else {
                continue;
            };
            if let Some(names) = scopes.get_mut(&obj.scope) {
                names.remove(&obj.name);
                if names.is_empty() {
                    scopes.remove(&obj.scope);
                }
            }
            if scopes.is_empty() {
                self.groups.remove(&obj.group);
            }
        }
    }

    pub fn contains(&self, obj: &Object) -> bool {
        self.groups
            .get(&obj.group)
            .and_then(|scopes| scopes.get(&obj.scope))
            .is_some_and(|names| names.contains_key(&obj.name))
    }

    /// Every object, ordered by group, scope and name.
    pub fn all(&self) -> Vec<Object> {
        self.groups
            .values()
            .flat_map(|scopes| scopes.values())
            .flat_map(|names| names.values().cloned())
            .collect()
    }

    /// Objects of one group by scope.
    pub fn by_group(&self, group: &str) -> BTreeMap<ObjectScope, Vec<Object>> {
        self.groups
            .get(group)
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|(scope, names)| (scope.clone(), names.values().cloned().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Objects of this set missing from `other`.
    pub fn difference(&self, other: &ObjectSet) -> ObjectSet {
        let mut diff = ObjectSet::new();
        diff.add(self.all().into_iter().filter(|o| !other.contains(o)));
        diff
    }

    pub fn len(&self) -> usize {
        self.groups
            .values()
            .flat_map(|scopes| scopes.values())
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Object> for ObjectSet {
    fn from_iter<I: IntoIterator<Item = Object>>(iter: I) -> Self {
        let mut set = ObjectSet::new();
        set.add(iter);
        set
    }
}
