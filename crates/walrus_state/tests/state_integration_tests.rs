//! Integration tests for state parsing.

use std::collections::BTreeSet;

use serde_json::json;
use tempfile::tempdir;
use walrus_state::{fingerprint, Mode, ParseOptions, StateDocument, StateError, StateParser};

const K8S: &str = "provider[\"registry.terraform.io/hashicorp/kubernetes\"]";

fn parser() -> StateParser {
    StateParser::new(ParseOptions::new("res-1", "proj-1", "env-1"))
}

fn state(resources: serde_json::Value) -> Vec<u8> {
    json!({
        "version": 4,
        "terraform_version": "1.5.7",
        "serial": 3,
        "lineage": "4c6f1e9a",
        "outputs": {},
        "resources": resources,
        "check_results": null
    })
    .to_string()
    .into_bytes()
}

fn resource(module: &str, mode: &str, ty: &str, name: &str, alias: &str, ids: &[&str]) -> serde_json::Value {
    let instances: Vec<_> = ids
        .iter()
        .map(|id| json!({"schema_version": 1, "attributes": {"id": id}}))
        .collect();
    json!({
        "module": module,
        "mode": mode,
        "type": ty,
        "name": name,
        "provider": format!("{}.{}", K8S, alias),
        "instances": instances
    })
}

#[test]
fn test_module_depths() {
    let raw = state(json!([
        resource("", "managed", "kubernetes_namespace", "ns", "kubernetesconnector--c1", &["dev"]),
        resource("module.web", "managed", "kubernetes_service", "svc", "kubernetesconnector--c1", &["dev/web"]),
        resource("module.web[0].module.db", "data", "kubernetes_secret", "pw", "kubernetesconnector--c2", &["dev/pw"]),
    ]));

    let outcome = parser().parse(&raw).unwrap();
    assert!(outcome.is_clean());

    let got: Vec<_> = outcome
        .instances
        .iter()
        .map(|i| (i.module.as_str(), i.mode, i.connector_id.as_str(), i.name.as_str()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("", Mode::Managed, "c1", "dev"),
            ("web", Mode::Managed, "c1", "dev/web"),
            ("db", Mode::Data, "c2", "dev/pw"),
        ]
    );

    for i in &outcome.instances {
        assert_eq!(i.resource_id, "res-1");
        assert_eq!(i.project_id, "proj-1");
        assert_eq!(i.environment_id, "env-1");
    }
}

#[test]
fn test_alias_collisions_keep_distinct_fingerprints() {
    // Same resource address through two connectors must stay two instances.
    let raw = state(json!([
        resource("module.app", "managed", "kubernetes_deployment", "app", "kubernetesconnector--c1", &["default/app"]),
        resource("module.app", "managed", "kubernetes_deployment", "app", "kubernetesconnector--c2", &["default/app"]),
    ]));

    let outcome = parser().parse(&raw).unwrap();
    let fingerprints: BTreeSet<_> = outcome.instances.iter().map(fingerprint).collect();
    assert_eq!(fingerprints.len(), 2);
    assert!(fingerprints.contains("c1-app-managed-kubernetes_deployment-default/app"));
}

#[test]
fn test_bad_resources_do_not_hide_good_ones() {
    let mut no_id = resource("module.a", "managed", "kubernetes_config_map", "cm", "kubernetesconnector--c1", &[]);
    no_id["instances"] = json!([{"attributes": {"name": "cm"}}]);

    let raw = state(json!([
        resource("module.a", "managed", "kubernetes_service", "svc", "no-alias", &["x"]),
        no_id,
        resource("module.a", "ephemeral", "random_password", "pw", "kubernetesconnector--c1", &["p"]),
        resource("module.a", "managed", "terraform_data", "marker", "kubernetesconnector--c1", &["m"]),
        resource("module.a", "managed", "kubernetes_secret", "ok", "kubernetesconnector--c1", &["default/ok"]),
    ]));

    let outcome = parser().parse(&raw).unwrap();
    assert_eq!(outcome.instances.len(), 1);
    assert_eq!(outcome.instances[0].name, "default/ok");
    assert_eq!(outcome.errors.len(), 2);
    assert!(matches!(outcome.errors[0], StateError::InvalidProvider(_)));
    assert!(matches!(outcome.errors[1], StateError::MissingId { .. }));
}

#[test]
fn test_helm_release_name_carries_namespace() {
    let mut release = resource("module.chart", "managed", "helm_release", "app", "helmconnector--c1", &["app"]);
    release["instances"][0]["attributes"]["metadata"] = json!([{"namespace": "apps"}]);

    let outcome = parser().parse(&state(json!([release]))).unwrap();
    assert_eq!(outcome.instances[0].name, "apps/app");
}

#[test]
fn test_fingerprints_are_stable_across_parses() {
    let raw = state(json!([
        resource("module.web", "managed", "kubernetes_service", "svc", "kubernetesconnector--c1", &["a", "b"]),
    ]));

    let first: Vec<_> = parser().parse(&raw).unwrap().instances.iter().map(fingerprint).collect();
    let second: Vec<_> = parser().parse(&raw).unwrap().instances.iter().map(fingerprint).collect();
    assert_eq!(first, second);
}

#[test]
fn test_parse_file_and_roundtrip_document() {
    let raw = state(json!([
        resource("", "managed", "kubernetes_namespace", "ns", "kubernetesconnector--c1", &["dev"]),
    ]));

    let dir = tempdir().unwrap();
    let path = dir.path().join("terraform.tfstate");
    std::fs::write(&path, &raw).unwrap();

    let outcome = parser().parse_file(&path).unwrap();
    assert_eq!(outcome.instances.len(), 1);

    let doc: StateDocument = serde_json::from_slice(&raw).unwrap();
    let written = serde_json::to_value(&doc).unwrap();
    assert!(written["check_results"].is_null());
    assert_eq!(written["lineage"], json!("4c6f1e9a"));
}
