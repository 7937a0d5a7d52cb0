//! Terraform state document model.
//!
//! Only the fields the parser needs are typed; everything else of an
//! instance is kept as raw JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A terraform state file (format version 4).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub terraform_version: String,
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub lineage: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, StateOutput>,
    #[serde(default)]
    pub resources: Vec<ResourceState>,
    /// Written as `null` when there are no check results.
    #[serde(
        default,
        serialize_with = "serialize_check_results",
        deserialize_with = "deserialize_check_results"
    )]
    pub check_results: Vec<serde_json::Value>,
}

/// An output recorded in the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateOutput {
    pub value: serde_json::Value,
    #[serde(rename = "type", default)]
    pub value_type: serde_json::Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,
}

/// One resource entry, holding all instances of a resource address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub each: Option<String>,
    pub provider: String,
    #[serde(default)]
    pub instances: Vec<InstanceState>,
}

impl ResourceState {
    /// Address of the resource, e.g. `module.web.kubernetes_service.svc`.
    pub fn address(&self) -> String {
        let local = format!("{}.{}", self.resource_type, self.name);
        let local = if self.mode == "data" {
            format!("data.{}", local)
        } else {
            local
        };
        if self.module.is_empty() {
            local
        } else {
            format!("{}.{}", self.module, local)
        }
    }
}

/// One instance object of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_key: Option<serde_json::Value>,
    #[serde(default)]
    pub schema_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_flat: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive_attributes: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn serialize_check_results<S>(v: &[serde_json::Value], s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if v.is_empty() {
        s.serialize_none()
    } else {
        s.collect_seq(v)
    }
}

fn deserialize_check_results<'de, D>(d: D) -> Result<Vec<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<serde_json::Value>>::deserialize(d)?.unwrap_or_default())
}
