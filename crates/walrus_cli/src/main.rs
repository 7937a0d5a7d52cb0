//! walrus CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Compile error
//! - 4: State error
//! - 5: Remote error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walrus_config::ConfigError;
use walrus_manifest::ManifestError;
use walrus_state::StateError;

mod commands;

use commands::{Cli, Commands, UsageError};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const COMPILE_ERROR: u8 = 3;
    pub const STATE_ERROR: u8 = 4;
    pub const REMOTE_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "walrus=debug,warn"
    } else {
        "walrus=info,warn"
    };
    // Ignore a subscriber that is already installed.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .try_init();

    let result = match cli.command {
        Commands::Compile(args) => commands::compile::execute(args).await,
        Commands::ParseState(args) => commands::parse_state::execute(args).await,
        Commands::Apply(args) => commands::operate::execute(commands::operate::Action::Apply, args).await,
        Commands::Preview(args) => {
            commands::operate::execute(commands::operate::Action::Preview, args).await
        }
        Commands::Delete(args) => commands::operate::execute(commands::operate::Action::Delete, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Pick the exit code from the first typed error in the chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if cause.is::<UsageError>() {
            return ExitCodes::INVALID_ARGS;
        }
        if cause.is::<ConfigError>() {
            return ExitCodes::COMPILE_ERROR;
        }
        if cause.is::<StateError>() {
            return ExitCodes::STATE_ERROR;
        }
        if let Some(err) = cause.downcast_ref::<ManifestError>() {
            return match err {
                ManifestError::InvalidManifest(_) => ExitCodes::INVALID_ARGS,
                _ => ExitCodes::REMOTE_ERROR,
            };
        }
    }
    ExitCodes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_error() {
        let compile: anyhow::Error = ConfigError::MissingVariable("x".to_string()).into();
        assert_eq!(categorize_error(&compile), ExitCodes::COMPILE_ERROR);

        let remote = Err::<(), _>(ManifestError::Api {
            status: 500,
            body: "boom".to_string(),
        })
        .context("apply failed")
        .unwrap_err();
        assert_eq!(categorize_error(&remote), ExitCodes::REMOTE_ERROR);

        let manifest: anyhow::Error = ManifestError::InvalidManifest("name is empty".to_string()).into();
        assert_eq!(categorize_error(&manifest), ExitCodes::INVALID_ARGS);

        let usage: anyhow::Error = UsageError("--server is required".to_string()).into();
        assert_eq!(categorize_error(&usage), ExitCodes::INVALID_ARGS);

        assert_eq!(categorize_error(&anyhow::anyhow!("other")), ExitCodes::GENERAL_ERROR);
    }
}
