//! Integration tests for the config compiler.

use std::fs;

use serde_json::json;
use tempfile::tempdir;
use walrus_config::{
    compile, compile_run, Connector, CreateOptions, ModuleConfig, ModuleOptions, Output,
    RequiredProvider, RunConfigInput, VariableValue, FILE_MAIN, FILE_VARS,
};

fn run_input() -> RunConfigInput {
    let mut input = RunConfigInput {
        server_url: "https://walrus.example.com".into(),
        token: "token-abc".into(),
        project_id: "proj".into(),
        environment_id: "dev".into(),
        resource_id: "res".into(),
        run_id: "run-1".into(),
        module: ModuleConfig::new("db", "github.com/walrus-catalog/mysql")
            .with_attribute("region", json!("us-east-1"))
            .with_attribute("count", json!(3))
            .with_attribute("password", json!("${var.db_password}"))
            .with_attribute("labels", json!({"team": "data", "owner": null}))
            .with_required_provider(RequiredProvider::new("kubernetes").with_source("hashicorp/kubernetes"))
            .with_output(Output::new("db", "address").with_expression("kubernetes_service.db.id")),
        connectors: vec![
            Connector::new("c2", "Kubernetes"),
            Connector::new("c1", "Kubernetes"),
        ],
        secret_mount_path: "/seal/secrets".into(),
        ..Default::default()
    };
    input
        .variables
        .insert("db_password".into(), VariableValue::new("hunter2", true));
    input
}

#[test]
fn test_compile_is_idempotent() {
    let input = run_input();

    let first = compile_run(&input).unwrap();
    let second = compile_run(&input).unwrap();

    assert_eq!(first.files, second.files);
}

#[test]
fn test_end_to_end_module_compile() {
    let compiled = compile_run(&run_input()).unwrap();
    let main = String::from_utf8(compiled.files[FILE_MAIN].clone()).unwrap();
    let vars = String::from_utf8(compiled.files[FILE_VARS].clone()).unwrap();

    // Module block carries literal attributes and only a reference to the secret.
    assert!(main.contains("module \"db\" {\n"));
    assert!(main.contains("  region = \"us-east-1\"\n"));
    assert!(main.contains("  count  = 3\n"));
    assert!(main.contains("${var._walrus_var_db_password}"));
    assert!(!main.contains("hunter2"));
    assert!(!main.contains("owner"));

    // The secret variable is declared sensitive and assigned in the vars file.
    assert!(main.contains("variable \"_walrus_var_db_password\" {\n  sensitive = true\n  type      = string\n}"));
    assert!(vars.contains("_walrus_var_db_password = \"hunter2\""));

    // Backend points at the run state endpoint.
    assert!(main.contains(
        "address                = \"https://walrus.example.com/v1/projects/proj/environments/dev/resources/res/runs/run-1/terraform-states\""
    ));

    // One aliased provider per connector, ordered by connector id.
    let c1 = main.find("kubernetesconnector--c1").unwrap();
    let c2 = main.find("kubernetesconnector--c2").unwrap();
    assert!(c1 < c2);
    assert!(main.contains("config_path = \"/seal/secrets/configc1\""));

    assert!(main.contains("output \"db_address\" {\n  sensitive = false\n  value     = module.db.address\n}"));
}

#[test]
fn test_block_order() {
    let main = String::from_utf8(compile_run(&run_input()).unwrap().files[FILE_MAIN].clone()).unwrap();

    let positions: Vec<usize> = ["terraform {", "provider \"kubernetes\"", "module \"db\"", "variable \"", "output \""]
        .iter()
        .map(|needle| main.find(needle).unwrap())
        .collect();

    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
}

#[test]
fn test_unrepresentable_attribute_aborts_compile() {
    let opts = CreateOptions {
        module_options: Some(ModuleOptions {
            module_configs: vec![ModuleConfig::new("web", "./web").with_attribute("bad name", json!(1))],
        }),
        ..Default::default()
    };

    assert!(compile(&opts).is_err());
}

#[test]
fn test_load_run_input_from_yaml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(
        &path,
        r#"
server_url: https://walrus.example.com
token: t
project_id: p
environment_id: e
resource_id: r
run_id: "1"
secret_mount_path: /seal/secrets
module:
  name: web
  source: ./modules/web
  attributes:
    image: nginx
    replicas: 2
"#,
    )
    .unwrap();

    let input = RunConfigInput::load(&path).unwrap();
    assert_eq!(input.module.name, "web");

    let compiled = compile_run(&input).unwrap();
    let main = String::from_utf8(compiled.files[FILE_MAIN].clone()).unwrap();
    assert!(main.contains("  image    = \"nginx\"\n"));
    assert!(main.contains("  replicas = 2\n"));
    assert!(compiled.files[FILE_VARS].is_empty());
}
