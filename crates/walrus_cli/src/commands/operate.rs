//! Apply, preview and delete commands - Push manifests to the server.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use walrus_core::SystemClock;
use walrus_manifest::{
    ApiClient, HttpApiClient, ObjectLoader, ObjectSet, OperateResult, Operator, WaitConfig, Waiter,
};

use super::{ServerArgs, UsageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Apply,
    Preview,
    Delete,
}

#[derive(Args)]
pub struct OperateArgs {
    #[command(flatten)]
    server: ServerArgs,

    /// Manifest files or directories
    #[arg(short, long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Search directories recursively
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Wait until the resources are ready or deleted
    #[arg(short, long)]
    wait: bool,

    /// Seconds to operate, and then to wait, before giving up
    #[arg(long, default_value_t = WaitConfig::default().timeout.as_secs())]
    timeout: u64,

    /// Labels of the runs the change triggers (key=value)
    #[arg(long = "run-label", value_parser = parse_label)]
    run_labels: Vec<(String, String)>,
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("label {:?} should be key=value", s)),
    }
}

pub async fn execute(action: Action, args: OperateArgs) -> Result<()> {
    let config = args.server.client_config()?;

    let set = ObjectLoader::new(&config)
        .with_run_labels(args.run_labels.iter().cloned().collect::<BTreeMap<_, _>>())
        .load_files(&args.files, args.recursive)?;
    if set.is_empty() {
        return Err(UsageError("no objects found in the given files".to_string()).into());
    }
    info!("{:?} {} objects on {}", action, set.len(), config.server);

    let client: Arc<dyn ApiClient> =
        Arc::new(HttpApiClient::new(config).context("Failed to create API client")?);
    let timeout = Duration::from_secs(args.timeout);

    for line in run(action, set, client, timeout, args.wait, |line| println!("{}", line)).await? {
        println!("{}", line);
    }
    Ok(())
}

/// Operate on `set`, then wait for the objects that changed when `wait` is set.
///
/// Each phase gives up after `timeout`. Returns the result lines; wait
/// progress goes to `printer` as it arrives.
pub async fn run(
    action: Action,
    set: ObjectSet,
    client: Arc<dyn ApiClient>,
    timeout: Duration,
    wait: bool,
    printer: impl Fn(&str) + Send + Sync + 'static,
) -> Result<Vec<String>> {
    let operator = Operator::new(client.clone(), Arc::new(SystemClock)).with_timeout(timeout);
    let result = match action {
        Action::Apply => operator.apply(set).await,
        Action::Preview => operator.preview(set).await,
        Action::Delete => operator.delete(set).await,
    };

    let waiting = wait && action != Action::Preview;
    let lines = result.messages(waiting);
    let OperateResult { success, error, .. } = result;
    if let Some(err) = error {
        for line in &lines {
            printer(line);
        }
        return Err(err).context(format!("{:?} failed", action));
    }

    if wait {
        let waiter = match action {
            Action::Apply => Waiter::for_status(client, timeout),
            Action::Delete => Waiter::for_delete(client, timeout),
            Action::Preview => {
                warn!("--wait has no effect on preview");
                return Ok(lines);
            }
        };
        for line in &lines {
            printer(line);
        }
        waiter
            .with_printer(printer)
            .wait(&success, &ObjectSet::new())
            .await
            .context("Failed waiting for resources")?;
        return Ok(Vec::new());
    }

    Ok(lines)
}
