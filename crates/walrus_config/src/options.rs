//! Compiler inputs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Separator between a provider name and a connector id in provider aliases.
pub const CONNECTOR_SEPARATOR: &str = "connector--";

/// Prefix of variables holding environment variable values.
pub const VARIABLE_PREFIX: &str = "_walrus_var_";

/// Prefix of variables holding dependency resource outputs.
pub const RESOURCE_PREFIX: &str = "_walrus_res_";

/// Prefix of variables holding sensitive connector configuration.
pub const CONNECTOR_PREFIX: &str = "_walrus_connector_";

/// Connector type whose credentials are a kubeconfig file.
pub const CONNECTOR_TYPE_KUBERNETES: &str = "Kubernetes";

/// Full input of one compiled file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    /// Top-level attributes, written as `name = value`.
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub terraform_options: Option<TerraformOptions>,
    pub provider_options: Option<ProviderOptions>,
    pub module_options: Option<ModuleOptions>,
    pub variable_options: Option<VariableOptions>,
    pub output_options: Vec<Output>,
}

/// Backend and provider requirement settings for the `terraform` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformOptions {
    /// State backend address.
    pub address: String,
    /// Run-scoped bearer token, used as the backend password.
    pub token: String,
    pub skip_tls_verify: bool,
    pub provider_requirements: BTreeMap<String, ProviderRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderRequirement {
    pub source: Option<String>,
    pub version_constraints: Vec<String>,
}

/// A provider required by a template, as declared in its schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredProvider {
    pub name: String,
    #[serde(flatten)]
    pub requirement: ProviderRequirement,
}

impl RequiredProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirement: ProviderRequirement::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.requirement.source = Some(source.into());
        self
    }

    pub fn with_version(mut self, constraint: impl Into<String>) -> Self {
        self.requirement.version_constraints.push(constraint.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    pub required_provider_names: Vec<String>,
    pub connectors: Vec<Connector>,
    /// Directory the run secret is mounted at inside the job.
    pub secret_mount_path: String,
    pub connector_separator: String,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            required_provider_names: Vec::new(),
            connectors: Vec::new(),
            secret_mount_path: "/seal/secrets".to_string(),
            connector_separator: CONNECTOR_SEPARATOR.to_string(),
        }
    }
}

/// A configured credential for one target platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connector {
    pub id: String,
    pub name: String,
    /// Platform type, e.g. `Kubernetes`, `AWS` or `Alibaba`.
    #[serde(rename = "type")]
    pub connector_type: String,
    pub category: String,
    pub config_data: BTreeMap<String, ConnectorConfigEntry>,
}

impl Connector {
    pub fn new(id: impl Into<String>, connector_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connector_type: connector_type.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        sensitive: bool,
    ) -> Self {
        self.config_data.insert(
            key.into(),
            ConnectorConfigEntry {
                value: value.into(),
                sensitive,
            },
        );
        self
    }

    pub fn is_kubernetes(&self) -> bool {
        self.connector_type.eq_ignore_ascii_case(CONNECTOR_TYPE_KUBERNETES)
    }

    /// Variable carrying the value of a sensitive config entry.
    ///
    /// Characters that are not valid in an identifier become `_`.
    pub fn config_variable(&self, key: &str) -> String {
        format!("{}{}_{}", CONNECTOR_PREFIX, self.id, key)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    }

    /// Name of the credential file mounted for this connector.
    pub fn secret_file_name(&self) -> String {
        format!("config{}", self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfigEntry {
    pub value: String,
    pub sensitive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleOptions {
    pub module_configs: Vec<ModuleConfig>,
}

/// A module reference and its resolved attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub name: String,
    pub source: String,
    pub schema_data: SchemaData,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub outputs: Vec<Output>,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_required_provider(mut self, provider: RequiredProvider) -> Self {
        self.schema_data.required_providers.push(provider);
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaData {
    pub required_providers: Vec<RequiredProvider>,
    pub readme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableOptions {
    pub variable_prefix: String,
    pub resource_prefix: String,
    /// Variable name to sensitive flag.
    pub variables: BTreeMap<String, bool>,
    /// Dependency outputs keyed `<resource>_<output>`.
    pub dependency_outputs: BTreeMap<String, OutputValue>,
    /// Full names of the variables holding sensitive connector config.
    pub connector_variables: BTreeSet<String>,
}

impl Default for VariableOptions {
    fn default() -> Self {
        Self {
            variable_prefix: VARIABLE_PREFIX.to_string(),
            resource_prefix: RESOURCE_PREFIX.to_string(),
            variables: BTreeMap::new(),
            dependency_outputs: BTreeMap::new(),
            connector_variables: BTreeSet::new(),
        }
    }
}

/// A value exported by an upstream resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputValue {
    pub value: serde_json::Value,
    pub sensitive: bool,
}

/// A module output re-exported at the root of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub name: String,
    pub resource_name: String,
    pub sensitive: bool,
    /// Expression the module computes the output from.
    pub value_expression: String,
}

impl Output {
    pub fn new(resource_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_name: resource_name.into(),
            ..Default::default()
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.value_expression = expression.into();
        self
    }
}
