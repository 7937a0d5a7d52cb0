//! Resource instances discovered from a state document.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an instance is managed by the run or only read from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Managed,
    Data,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "managed" => Some(Mode::Managed),
            "data" => Some(Mode::Data),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Managed => "managed",
            Mode::Data => "data",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine that produced an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployerType {
    #[default]
    Terraform,
}

impl fmt::Display for DeployerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployerType::Terraform => write!(f, "terraform"),
        }
    }
}

/// Observed status of an instance in its cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Unknown,
    Ready,
    Transitioning,
    Error(String),
}

/// A provider-level object created or read by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstance {
    /// Empty until persisted.
    #[serde(default)]
    pub id: String,
    pub resource_id: String,
    pub project_id: String,
    pub environment_id: String,
    pub connector_id: String,
    pub mode: Mode,
    pub module: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub deployer_type: DeployerType,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
}

impl ResourceInstance {
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

/// Identity of an instance within a resource.
///
/// Two instances with equal fingerprints are the same provider object.
pub fn fingerprint(r: &ResourceInstance) -> String {
    [
        r.connector_id.as_str(),
        r.module.as_str(),
        r.mode.as_str(),
        r.resource_type.as_str(),
        r.name.as_str(),
    ]
    .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ResourceInstance {
        ResourceInstance {
            id: String::new(),
            resource_id: "r1".into(),
            project_id: "p1".into(),
            environment_id: "e1".into(),
            connector_id: "123".into(),
            mode: Mode::Managed,
            module: "web".into(),
            resource_type: "kubernetes_deployment".into(),
            name: "default/web".into(),
            deployer_type: DeployerType::Terraform,
            status: InstanceStatus::Unknown,
            create_time: None,
        }
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(
            fingerprint(&instance()),
            "123-web-managed-kubernetes_deployment-default/web"
        );
    }

    #[test]
    fn test_fingerprint_ignores_persistence_fields() {
        let a = instance();
        let mut b = instance();
        b.id = "generated".into();
        b.status = InstanceStatus::Ready;
        b.create_time = Some(Utc::now());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("managed"), Some(Mode::Managed));
        assert_eq!(Mode::parse("data"), Some(Mode::Data));
        assert_eq!(Mode::parse("ephemeral"), None);
    }
}
