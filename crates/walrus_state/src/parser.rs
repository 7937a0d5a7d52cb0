//! Parse a state document into resource instances.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::document::{InstanceState, ResourceState, StateDocument, StateOutput};
use crate::error::{StateError, StateResult};
use crate::instance::{DeployerType, InstanceStatus, Mode, ResourceInstance};

/// Separator between the provider name and the connector id in an alias.
pub const CONNECTOR_SEPARATOR: &str = "connector--";

/// Resource type used by terraform for bookkeeping only.
const SKIPPED_TYPE: &str = "terraform_data";
const HELM_RELEASE_TYPE: &str = "helm_release";
const DEFAULT_NAMESPACE: &str = "default";

/// Identity stamped onto every parsed instance.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub resource_id: String,
    pub project_id: String,
    pub environment_id: String,
    pub deployer_type: DeployerType,
    pub connector_separator: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            resource_id: String::new(),
            project_id: String::new(),
            environment_id: String::new(),
            deployer_type: DeployerType::Terraform,
            connector_separator: CONNECTOR_SEPARATOR.to_string(),
        }
    }
}

impl ParseOptions {
    pub fn new(
        resource_id: impl Into<String>,
        project_id: impl Into<String>,
        environment_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            project_id: project_id.into(),
            environment_id: environment_id.into(),
            ..Default::default()
        }
    }
}

/// Instances found in a document plus the resources that failed to parse.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub instances: Vec<ResourceInstance>,
    pub errors: Vec<StateError>,
}

impl ParseOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Turns raw state bytes into [`ResourceInstance`]s.
pub struct StateParser {
    opts: ParseOptions,
}

impl StateParser {
    pub fn new(opts: ParseOptions) -> Self {
        Self { opts }
    }

    /// Parse a state document.
    ///
    /// Only an unreadable document is an error. A resource that cannot be
    /// parsed is recorded in [`ParseOutcome::errors`] and the rest of the
    /// document is still parsed. An empty input yields no instances.
    pub fn parse(&self, raw: &[u8]) -> StateResult<ParseOutcome> {
        let mut outcome = ParseOutcome::default();
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(outcome);
        }

        let doc: StateDocument = serde_json::from_slice(raw)?;

        for rs in &doc.resources {
            let mode = match Mode::parse(&rs.mode) {
                Some(m) => m,
                None => {
                    warn!("Skip resource {} with unknown mode: {}", rs.address(), rs.mode);
                    continue;
                }
            };
            if rs.resource_type == SKIPPED_TYPE {
                debug!("Skip resource {}", rs.address());
                continue;
            }

            match self.parse_resource(rs, mode) {
                Ok(instances) => outcome.instances.extend(instances),
                Err(e) => {
                    warn!("Failed to parse resource {}: {}", rs.address(), e);
                    outcome.errors.push(e);
                }
            }
        }

        info!(
            "Parsed {} instances of resource {} ({} errors)",
            outcome.instances.len(),
            self.opts.resource_id,
            outcome.errors.len()
        );
        Ok(outcome)
    }

    /// Read and parse a state file.
    pub fn parse_file(&self, path: &Path) -> StateResult<ParseOutcome> {
        let raw = std::fs::read(path)?;
        self.parse(&raw)
    }

    fn parse_resource(&self, rs: &ResourceState, mode: Mode) -> StateResult<Vec<ResourceInstance>> {
        let module = module_name(&rs.module)?;
        let connector_id = connector_id(&rs.provider, &self.opts.connector_separator)?;

        rs.instances
            .iter()
            .map(|is| {
                let mut name = instance_id(is).ok_or_else(|| StateError::MissingId {
                    address: rs.address(),
                })?;
                if rs.resource_type == HELM_RELEASE_TYPE && !name.contains('/') {
                    name = format!("{}/{}", release_namespace(is), name);
                }

                Ok(ResourceInstance {
                    id: String::new(),
                    resource_id: self.opts.resource_id.clone(),
                    project_id: self.opts.project_id.clone(),
                    environment_id: self.opts.environment_id.clone(),
                    connector_id: connector_id.clone(),
                    mode,
                    module: module.clone(),
                    resource_type: rs.resource_type.clone(),
                    name,
                    deployer_type: self.opts.deployer_type,
                    status: InstanceStatus::Unknown,
                    create_time: Some(Utc::now()),
                })
            })
            .collect()
    }
}

/// Outputs recorded in a state document.
pub fn parse_outputs(raw: &[u8]) -> StateResult<BTreeMap<String, StateOutput>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    let doc: StateDocument = serde_json::from_slice(raw)?;
    Ok(doc.outputs)
}

/// Innermost module name of a module address.
///
/// `module.a[0].module.b` gives `b`, the root module gives an empty name.
pub fn module_name(address: &str) -> StateResult<String> {
    if address.is_empty() {
        return Ok(String::new());
    }

    let invalid = || StateError::InvalidModule(address.to_string());
    let mut rest = address;
    let mut name = None;

    loop {
        let (step, after) = split_identifier(rest).ok_or_else(invalid)?;
        rest = after;

        if step == "module" {
            rest = rest.strip_prefix('.').ok_or_else(invalid)?;
            let (module, after) = split_identifier(rest).ok_or_else(invalid)?;
            name = Some(module);
            rest = after;
        } else if name.is_none() {
            return Err(invalid());
        }

        rest = skip_indexes(rest).ok_or_else(invalid)?;
        if rest.is_empty() {
            break;
        }
        rest = rest.strip_prefix('.').ok_or_else(invalid)?;
    }

    name.map(str::to_string).ok_or_else(invalid)
}

/// Connector id encoded in the provider alias of a resource.
pub fn connector_id(provider: &str, separator: &str) -> StateResult<String> {
    let parts: Vec<&str> = provider.split(separator).collect();
    if parts.len() != 2 {
        return Err(StateError::InvalidProvider(provider.to_string()));
    }

    let id = parts[1].trim_end_matches("\"]").trim_end_matches('"');
    if id.is_empty() {
        return Err(StateError::InvalidProvider(provider.to_string()));
    }
    Ok(id.to_string())
}

/// The `id` attribute of an instance, typed attributes first.
pub fn instance_id(is: &InstanceState) -> Option<String> {
    let typed = is
        .attributes
        .as_ref()
        .and_then(|a| a.get("id"))
        .and_then(|id| match id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    typed.or_else(|| {
        is.attributes_flat
            .as_ref()
            .and_then(|flat| flat.get("id").cloned())
    })
}

/// Namespace of a helm release; releases ids do not carry it.
fn release_namespace(is: &InstanceState) -> String {
    let metadata = is.attributes.as_ref().and_then(|a| a.get("metadata"));
    let metadata = match metadata {
        Some(serde_json::Value::Array(items)) => items.first(),
        other => other,
    };

    metadata
        .and_then(|m| m.get("namespace"))
        .and_then(|ns| ns.as_str())
        .filter(|ns| !ns.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string()
}

fn split_identifier(s: &str) -> Option<(&str, &str)> {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return None,
    }
    let end = chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}

fn skip_indexes(mut s: &str) -> Option<&str> {
    while let Some(inner) = s.strip_prefix('[') {
        let end = if let Some(quoted) = inner.strip_prefix('"') {
            let mut escaped = false;
            let close = quoted.char_indices().find(|(_, c)| {
                let hit = !escaped && *c == '"';
                escaped = !escaped && *c == '\\';
                hit
            })?;
            1 + close.0 + 1
        } else {
            let digits = inner.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            digits
        };
        s = inner[end..].strip_prefix(']')?;
    }
    Some(s)
}
