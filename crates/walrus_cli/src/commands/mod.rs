//! CLI command definitions.
//!
//! `compile` and `parse-state` work on local files. `apply`, `preview` and
//! `delete` push manifests to a walrus server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use walrus_manifest::ClientConfig;

pub mod compile;
pub mod operate;
pub mod parse_state;

/// walrus - resource provisioning from IaC modules
#[derive(Parser)]
#[command(name = "walrus")]
#[command(version, about = "walrus - resource provisioning from IaC modules")]
#[command(long_about = r#"
walrus compiles IaC modules into runnable configuration, parses the state
they produce and manages resources on a walrus server.

COMMANDS:
  compile      → Compile a run input into main.tf and terraform.tfvars
  parse-state  → Print the resource instances found in a state file
  apply        → Create or patch the resources in manifests
  preview      → Ask the server to preview applying manifests
  delete       → Delete the resources in manifests

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Compile error
  4 - State error
  5 - Remote error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile the configuration of one run
    Compile(compile::CompileArgs),

    /// Parse a state file into resource instances
    #[command(name = "parse-state")]
    ParseState(parse_state::ParseStateArgs),

    /// Apply manifests
    Apply(operate::OperateArgs),

    /// Preview manifests
    Preview(operate::OperateArgs),

    /// Delete the resources in manifests
    Delete(operate::OperateArgs),
}

/// Arguments the user got wrong in a way clap cannot check.
#[derive(Debug, thiserror::Error)]
#[error("invalid argument: {0}")]
pub struct UsageError(pub String);

/// Server context, from a config file overridden by flags.
#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Config file with the server context
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address of the walrus server
    #[arg(long, env = "WALRUS_SERVER")]
    pub server: Option<String>,

    /// API token
    #[arg(long, env = "WALRUS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Default project of objects
    #[arg(short, long, env = "WALRUS_PROJECT")]
    pub project: Option<String>,

    /// Default environment of objects
    #[arg(short, long, env = "WALRUS_ENVIRONMENT")]
    pub environment: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
}

impl ServerArgs {
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ClientConfig::new(""),
        };

        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(token) = &self.token {
            config.token = token.clone();
        }
        if let Some(project) = &self.project {
            config.project = project.clone();
        }
        if let Some(environment) = &self.environment {
            config.environment = environment.clone();
        }
        if self.insecure {
            config.insecure = true;
        }

        if config.server.is_empty() {
            return Err(UsageError("--server is required".to_string()).into());
        }
        Ok(config)
    }
}
