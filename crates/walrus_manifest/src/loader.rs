//! Load object sets from YAML manifests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ClientConfig;
use crate::error::{ManifestError, ManifestResult};
use crate::object::{Object, ObjectScope, ObjectSet, GROUP_RESOURCES, GROUP_SEQUENCE};

const YAML_SUFFIXES: &[&str] = &[".yaml", ".yml"];

/// Reads manifests whose root maps a group to a list of objects.
///
/// ```yaml
/// resources:
///   - name: web
///     type: webservice
///     attributes:
///       image: nginx
/// ```
pub struct ObjectLoader {
    project: String,
    environment: String,
    run_labels: BTreeMap<String, String>,
}

impl ObjectLoader {
    /// Objects without a project or environment default to the context's.
    pub fn new(context: &ClientConfig) -> Self {
        Self {
            project: context.project.clone(),
            environment: context.environment.clone(),
            run_labels: BTreeMap::new(),
        }
    }

    /// Labels attached to the runs the objects trigger.
    pub fn with_run_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.run_labels = labels;
        self
    }

    /// Load every YAML file under `paths`; directories are searched
    /// one level deep unless `recursive`.
    pub fn load_files(&self, paths: &[PathBuf], recursive: bool) -> ManifestResult<ObjectSet> {
        let mut set = ObjectSet::new();
        for root in paths {
            for file in find_yaml_files(root, recursive)? {
                let loaded = self.load_file(&file).map_err(|e| {
                    ManifestError::InvalidManifest(format!("{}: {}", file.display(), e))
                })?;
                set.add(loaded.all());
            }
        }
        Ok(set)
    }

    pub fn load_file(&self, path: &Path) -> ManifestResult<ObjectSet> {
        debug!("Loading manifest {:?}", path);
        let content = fs::read(path)?;
        self.load_bytes(&content)
    }

    pub fn load_bytes(&self, bytes: &[u8]) -> ManifestResult<ObjectSet> {
        let root: Value = serde_yaml::from_slice(bytes)?;
        let root = match root {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(ManifestError::InvalidManifest(
                    "root should be a map of groups".to_string(),
                ))
            }
        };

        let mut set = ObjectSet::new();
        for group in GROUP_SEQUENCE {
            let Some(list) = root.get(*group) else {
                continue;
            };
            let Value::Array(items) = list else {
                return Err(ManifestError::InvalidManifest(format!(
                    "invalid {} list: should be array",
                    group
                )));
            };

            for item in items {
                let Value::Object(item) = item else {
                    return Err(ManifestError::InvalidManifest(format!(
                        "invalid {}: should be map",
                        group
                    )));
                };
                if let Some(obj) = self.to_object(group, item.clone())? {
                    set.add([obj]);
                }
            }
        }
        Ok(set)
    }

    fn to_object(&self, group: &str, mut value: Map<String, Value>) -> ManifestResult<Option<Object>> {
        if value.is_empty() {
            return Ok(None);
        }

        let name = value
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ManifestError::InvalidManifest("name is empty".to_string()))?
            .to_string();

        let mut scope = ObjectScope::new(
            scope_name(&value, "project")?,
            scope_name(&value, "environment")?,
        );

        if group != GROUP_RESOURCES {
            return Err(ManifestError::InvalidManifest(format!(
                "unsupported group {}",
                group
            )));
        }

        if scope.project.is_empty() {
            scope.project = self.project.clone();
        }
        if scope.environment.is_empty() {
            scope.environment = self.environment.clone();
        }
        if scope.project.is_empty() || scope.environment.is_empty() {
            return Err(ManifestError::InvalidManifest(format!(
                "need to indicate the project name and environment name for resource {}",
                name
            )));
        }

        value.insert("project".to_string(), json!({ "name": scope.project }));
        value.insert("environment".to_string(), json!({ "name": scope.environment }));
        value.insert("runLabels".to_string(), json!(self.run_labels));

        let mut obj = Object::new(group, scope, name);
        obj.value = value;
        Ok(Some(obj))
    }
}

/// `<key>.name` of an object; absent means unset.
fn scope_name(value: &Map<String, Value>, key: &str) -> ManifestResult<String> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::Object(m)) => Ok(m
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()),
        Some(_) => Err(ManifestError::InvalidManifest(format!("{} is invalid", key))),
    }
}

fn find_yaml_files(root: &Path, recursive: bool) -> ManifestResult<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_file() && YAML_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
