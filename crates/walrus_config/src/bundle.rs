//! Compile the full configuration of one resource run.
//!
//! A run needs two files: `main` holds the backend, provider, module,
//! variable and output blocks, `vars` holds the values of the generated
//! variables. Secret values therefore only ever appear in `vars` while `main`
//! references them by name.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compiler::{compile_files, FILE_MAIN, FILE_VARS};
use crate::error::{ConfigError, ConfigResult};
use crate::interpolation::{mark_sensitive_outputs, Interpolator};
use crate::provider::connector_secrets;
use crate::options::{
    Connector, CreateOptions, ModuleConfig, ModuleOptions, OutputValue, ProviderOptions,
    ProviderRequirement, RequiredProvider, TerraformOptions, VariableOptions,
    CONNECTOR_SEPARATOR, RESOURCE_PREFIX, VARIABLE_PREFIX,
};

/// Path of the state backend relative to the server address.
const BACKEND_API: &str = "/v1/projects/{project}/environments/{environment}/resources/{resource}/runs/{run}/terraform-states";

/// An environment variable available to the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableValue {
    pub value: String,
    pub sensitive: bool,
}

impl VariableValue {
    pub fn new(value: impl Into<String>, sensitive: bool) -> Self {
        Self {
            value: value.into(),
            sensitive,
        }
    }
}

/// Everything needed to compile the configuration of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfigInput {
    pub server_url: String,
    pub token: String,
    pub skip_tls_verify: bool,
    pub project_id: String,
    pub environment_id: String,
    pub resource_id: String,
    pub run_id: String,
    pub module: ModuleConfig,
    /// Providers required by earlier runs, kept so their resources can be destroyed.
    pub previous_required_providers: Vec<RequiredProvider>,
    /// Module variables declared write-only.
    pub sensitive_module_variables: BTreeSet<String>,
    pub variables: BTreeMap<String, VariableValue>,
    /// Upstream outputs keyed `<resource>_<output>`.
    pub dependency_outputs: BTreeMap<String, OutputValue>,
    pub connectors: Vec<Connector>,
    pub secret_mount_path: String,
}

impl RunConfigInput {
    /// Load an input document from a YAML or JSON file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// State backend address of the run.
    pub fn backend_address(&self) -> String {
        let api = BACKEND_API
            .replace("{project}", &self.project_id)
            .replace("{environment}", &self.environment_id)
            .replace("{resource}", &self.resource_id)
            .replace("{run}", &self.run_id);
        format!("{}{}", self.server_url.trim_end_matches('/'), api)
    }
}

/// Compiled files plus what the run should persist alongside them.
#[derive(Debug, Clone, Default)]
pub struct CompiledRun {
    /// Compiled bytes keyed by file key (`main`, `vars`).
    pub files: BTreeMap<String, Vec<u8>>,
    /// Values of the variables the module references.
    pub variables: BTreeMap<String, String>,
    /// Providers the configuration requires.
    pub required_providers: Vec<RequiredProvider>,
}

/// Compile the `main` and `vars` files of a run.
pub fn compile_run(input: &RunConfigInput) -> ConfigResult<CompiledRun> {
    let required_providers = merge_required_providers(
        &input.module.schema_data.required_providers,
        &input.previous_required_providers,
    );

    let interpolator = Interpolator::new(VARIABLE_PREFIX, RESOURCE_PREFIX)?;
    let interpolated = interpolator.interpolate(&input.module.attributes);
    interpolated.check_outputs(&input.dependency_outputs)?;

    let mut variables = BTreeMap::new();
    for name in &interpolated.variables {
        let variable = input
            .variables
            .get(name)
            .ok_or_else(|| ConfigError::MissingVariable(name.clone()))?;
        variables.insert(name.clone(), variable.clone());
    }

    let dependency_outputs: BTreeMap<String, OutputValue> = interpolated
        .outputs
        .iter()
        .filter_map(|r| {
            let key = r.key();
            input.dependency_outputs.get(&key).map(|v| (key, v.clone()))
        })
        .collect();

    let mut module = input.module.clone();
    module.attributes = interpolated.attributes;
    for output in &mut module.outputs {
        if output.resource_name.is_empty() {
            output.resource_name = module.name.clone();
        }
    }
    mark_sensitive_outputs(&mut module.outputs, &input.sensitive_module_variables)?;
    module.schema_data.required_providers = required_providers.clone();

    let provider_options = ProviderOptions {
        required_provider_names: required_providers.iter().map(|p| p.name.clone()).collect(),
        connectors: input.connectors.clone(),
        secret_mount_path: input.secret_mount_path.clone(),
        connector_separator: CONNECTOR_SEPARATOR.to_string(),
    };
    let connector_secrets = connector_secrets(&provider_options);

    let main = CreateOptions {
        attributes: BTreeMap::new(),
        terraform_options: Some(TerraformOptions {
            address: input.backend_address(),
            token: input.token.clone(),
            skip_tls_verify: input.skip_tls_verify,
            provider_requirements: required_providers
                .iter()
                .map(|p| (p.name.clone(), p.requirement.clone()))
                .collect::<BTreeMap<String, ProviderRequirement>>(),
        }),
        provider_options: Some(provider_options),
        output_options: module.outputs.clone(),
        module_options: Some(ModuleOptions {
            module_configs: vec![module],
        }),
        variable_options: Some(VariableOptions {
            variables: variables.iter().map(|(k, v)| (k.clone(), v.sensitive)).collect(),
            dependency_outputs: dependency_outputs.clone(),
            connector_variables: connector_secrets.keys().cloned().collect(),
            ..Default::default()
        }),
    };

    let vars = vars_options(&variables, &dependency_outputs, &connector_secrets);

    let mut files = BTreeMap::new();
    files.insert(FILE_MAIN.to_string(), main);
    files.insert(FILE_VARS.to_string(), vars);
    let files = compile_files(&files)?;

    info!(
        "Compiled configuration for run {} ({} variables, {} dependency outputs)",
        input.run_id,
        variables.len(),
        dependency_outputs.len()
    );

    Ok(CompiledRun {
        files,
        variables: variables.into_iter().map(|(k, v)| (k, v.value)).collect(),
        required_providers,
    })
}

/// Options of the `vars` file assigning each generated variable.
///
/// `connector_secrets` is keyed by full variable name.
pub fn vars_options(
    variables: &BTreeMap<String, VariableValue>,
    dependency_outputs: &BTreeMap<String, OutputValue>,
    connector_secrets: &BTreeMap<String, String>,
) -> CreateOptions {
    let mut opts = CreateOptions::default();

    for (name, v) in variables {
        opts.attributes.insert(
            format!("{}{}", VARIABLE_PREFIX, name),
            serde_json::Value::String(v.value.clone()),
        );
    }

    for (name, o) in dependency_outputs {
        // Generated variables are typed string, so structured outputs are passed encoded.
        let value = match &o.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        opts.attributes.insert(
            format!("{}{}", RESOURCE_PREFIX, name),
            serde_json::Value::String(value),
        );
    }

    for (name, value) in connector_secrets {
        opts.attributes
            .insert(name.clone(), serde_json::Value::String(value.clone()));
    }

    opts
}

/// Merge current and previous provider requirements, first one wins.
fn merge_required_providers(
    current: &[RequiredProvider],
    previous: &[RequiredProvider],
) -> Vec<RequiredProvider> {
    let mut seen = BTreeSet::new();
    let mut merged = Vec::new();
    for p in current.iter().chain(previous) {
        if seen.insert(p.name.clone()) {
            merged.push(p.clone());
        } else {
            debug!("Skip duplicate provider requirement: {}", p.name);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Output;
    use serde_json::json;

    fn input() -> RunConfigInput {
        RunConfigInput {
            server_url: "https://walrus.local/".into(),
            token: "run-token".into(),
            project_id: "p1".into(),
            environment_id: "e1".into(),
            resource_id: "r1".into(),
            run_id: "run1".into(),
            module: ModuleConfig::new("web", "github.com/walrus/web")
                .with_attribute("region", json!("us-east-1"))
                .with_attribute("count", json!(3))
                .with_attribute("password", json!("${var.db_password}"))
                .with_required_provider(RequiredProvider::new("kubernetes"))
                .with_output(Output::new("", "endpoint").with_expression("aws_lb.web.dns")),
            secret_mount_path: "/seal/secrets".into(),
            connectors: vec![Connector::new("c1", "Kubernetes")],
            ..Default::default()
        }
    }

    #[test]
    fn test_backend_address() {
        assert_eq!(
            input().backend_address(),
            "https://walrus.local/v1/projects/p1/environments/e1/resources/r1/runs/run1/terraform-states"
        );
    }

    #[test]
    fn test_compile_run_missing_variable() {
        let err = compile_run(&input()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(name) if name == "db_password"));
    }

    #[test]
    fn test_compile_run_keeps_secret_out_of_main() {
        let mut input = input();
        input
            .variables
            .insert("db_password".into(), VariableValue::new("s3cr3t", true));

        let compiled = compile_run(&input).unwrap();
        let main = String::from_utf8(compiled.files[FILE_MAIN].clone()).unwrap();
        let vars = String::from_utf8(compiled.files[FILE_VARS].clone()).unwrap();

        assert!(!main.contains("s3cr3t"));
        assert!(main.contains("password  = \"${var._walrus_var_db_password}\""));
        assert!(main.contains("variable \"_walrus_var_db_password\" {\n  sensitive = true\n"));
        assert!(main.contains("output \"web_endpoint\""));
        assert_eq!(vars, "_walrus_var_db_password = \"s3cr3t\"\n");
        assert_eq!(compiled.variables["db_password"], "s3cr3t");
    }

    #[test]
    fn test_compile_run_keeps_connector_secret_out_of_main() {
        let mut input = input();
        input.module = ModuleConfig::new("web", "github.com/walrus/web")
            .with_required_provider(RequiredProvider::new("alicloud"));
        input.connectors = vec![Connector::new("9", "alicloud")
            .with_config("region", "cn-hangzhou", false)
            .with_config("secret_key", "TOPSECRET", true)];

        let compiled = compile_run(&input).unwrap();
        let main = String::from_utf8(compiled.files[FILE_MAIN].clone()).unwrap();
        let vars = String::from_utf8(compiled.files[FILE_VARS].clone()).unwrap();

        assert!(!main.contains("TOPSECRET"));
        assert!(main.contains("secret_key = var._walrus_connector_9_secret_key"));
        assert!(main.contains("variable \"_walrus_connector_9_secret_key\" {\n  sensitive = true\n"));
        assert!(main.contains("region     = \"cn-hangzhou\""));
        assert_eq!(vars, "_walrus_connector_9_secret_key = \"TOPSECRET\"\n");
    }

    #[test]
    fn test_merge_required_providers() {
        let merged = merge_required_providers(
            &[RequiredProvider::new("kubernetes")],
            &[RequiredProvider::new("kubernetes"), RequiredProvider::new("helm")],
        );
        let names: Vec<_> = merged.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["kubernetes", "helm"]);
    }

    #[test]
    fn test_vars_options_encodes_structured_outputs() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "db_hosts".to_string(),
            OutputValue {
                value: json!(["a", "b"]),
                sensitive: false,
            },
        );

        let opts = vars_options(&BTreeMap::new(), &outputs, &BTreeMap::new());
        assert_eq!(
            opts.attributes["_walrus_res_db_hosts"],
            json!("[\"a\",\"b\"]")
        );
    }
}
