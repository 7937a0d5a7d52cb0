//! Compile command - Write the configuration files of a run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use walrus_config::{compile_run, file_name, RunConfigInput};

#[derive(Args)]
pub struct CompileArgs {
    /// Run input document (YAML or JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Directory the files are written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
}

pub async fn execute(args: CompileArgs) -> Result<()> {
    info!("Compiling run input: {:?}", args.input);

    let input = RunConfigInput::load(&args.input)
        .with_context(|| format!("Failed to load run input {}", args.input.display()))?;

    for path in write_run(&input, &args.output)? {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// Compile `input` and write every file into `dir`.
fn write_run(input: &RunConfigInput, dir: &Path) -> Result<Vec<PathBuf>> {
    let compiled = compile_run(input).context("Failed to compile run configuration")?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for (key, content) in &compiled.files {
        let path = dir.join(file_name(key));
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
