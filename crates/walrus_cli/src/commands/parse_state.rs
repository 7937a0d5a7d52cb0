//! Parse-state command - Print the instances or outputs of a state file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use walrus_state::{parse_outputs, ParseOptions, StateParser};

#[derive(Args)]
pub struct ParseStateArgs {
    /// State file produced by a run
    #[arg(short, long)]
    file: PathBuf,

    /// Resource the instances belong to
    #[arg(long, default_value = "")]
    resource: String,

    #[arg(long, default_value = "")]
    project: String,

    #[arg(long, default_value = "")]
    environment: String,

    /// Print the root outputs instead of the instances
    #[arg(long)]
    outputs: bool,

    /// Fail when any resource cannot be parsed
    #[arg(long)]
    strict: bool,
}

pub async fn execute(args: ParseStateArgs) -> Result<()> {
    info!("Parsing state: {:?}", args.file);

    let raw = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    println!("{}", render(&args, &raw)?);
    Ok(())
}

/// Parse `raw` and render the result as pretty JSON.
fn render(args: &ParseStateArgs, raw: &[u8]) -> Result<String> {
    if args.outputs {
        let outputs = parse_outputs(raw).context("Failed to parse state outputs")?;
        return Ok(serde_json::to_string_pretty(&outputs)?);
    }

    let parser = StateParser::new(ParseOptions::new(
        args.resource.as_str(),
        args.project.as_str(),
        args.environment.as_str(),
    ));
    let mut outcome = parser.parse(raw).context("Failed to parse state")?;

    for err in &outcome.errors {
        warn!("Skipped resource: {}", err);
    }
    if args.strict && !outcome.errors.is_empty() {
        let first = outcome.errors.remove(0);
        return Err(first).context(format!("{} resources could not be parsed", outcome.errors.len() + 1));
    }

    Ok(serde_json::to_string_pretty(&outcome.instances)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use walrus_state::StateError;

    const STATE: &str = r#"{
        "version": 4,
        "outputs": {"endpoint": {"value": "10.0.0.5", "type": "string"}},
        "resources": [{
            "mode": "managed",
            "type": "kubernetes_deployment",
            "name": "app",
            "provider": "provider[\"registry.terraform.io/hashicorp/kubernetes\"].connector--c1",
            "module": "module.web",
            "instances": [{"attributes": {"id": "default/web"}}]
        }, {
            "mode": "managed",
            "type": "kubernetes_service",
            "name": "svc",
            "provider": "provider[\"registry.terraform.io/hashicorp/kubernetes\"].connector--c1",
            "instances": [{"attributes": {}}]
        }]
    }"#;

    fn args(outputs: bool) -> ParseStateArgs {
        ParseStateArgs {
            file: PathBuf::from("state.json"),
            resource: "r1".to_string(),
            project: "p1".to_string(),
            environment: "e1".to_string(),
            outputs,
            strict: false,
        }
    }

    #[test]
    fn test_render_instances() {
        let rendered = render(&args(false), STATE.as_bytes()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        let instances = value.as_array().unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0]["resource_id"], "r1");
        assert_eq!(instances[0]["name"], "default/web");
        assert_eq!(instances[0]["connector_id"], "c1");
    }

    #[test]
    fn test_strict_fails_on_skipped_resource() {
        let mut strict = args(false);
        strict.strict = true;
        let err = render(&strict, STATE.as_bytes()).unwrap_err();
        assert!(err.chain().any(|c| c.is::<StateError>()));
    }

    #[test]
    fn test_render_outputs() {
        let rendered = render(&args(true), STATE.as_bytes()).unwrap();
        assert!(rendered.contains("10.0.0.5"));
    }

    #[test]
    fn test_unreadable_state_is_state_error() {
        let err = render(&args(false), b"{not json").unwrap_err();
        assert!(err.chain().any(|c| c.is::<StateError>()));
    }
}
