//! Compile [`CreateOptions`] into terraform configuration bytes.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::block::{Block, BlockType};
use crate::error::ConfigResult;
use crate::options::{CreateOptions, ModuleConfig, Output, TerraformOptions, VariableOptions};
use crate::provider::{block_alias, provider_blocks};
use crate::value::{from_json_map, Value};
use crate::writer::HclFile;

/// Key of the main configuration file.
pub const FILE_MAIN: &str = "main";
/// Key of the variable values file.
pub const FILE_VARS: &str = "vars";

/// Username the backend authenticates with. The token is the password.
const BACKEND_USERNAME: &str = "seal";
const BACKEND_UPDATE_METHOD: &str = "PUT";
const BACKEND_RETRY_MAX: i64 = 10;
const BACKEND_RETRY_WAIT_MAX: i64 = 5;

/// File name a compiled file is mounted as.
pub fn file_name(key: &str) -> String {
    match key {
        FILE_MAIN => "main.tf".to_string(),
        FILE_VARS => "terraform.tfvars".to_string(),
        other => other.to_string(),
    }
}

/// Compile one file.
///
/// Blocks are emitted in a fixed order: terraform, providers, modules,
/// variables, outputs. Any error aborts the whole compile.
pub fn compile(opts: &CreateOptions) -> ConfigResult<Vec<u8>> {
    let file = build_file(opts)?;
    if file.is_empty() {
        return Ok(Vec::new());
    }
    file.to_bytes()
}

/// Compile several files; fails without output if any file fails.
pub fn compile_files(
    files: &BTreeMap<String, CreateOptions>,
) -> ConfigResult<BTreeMap<String, Vec<u8>>> {
    let mut out = BTreeMap::new();
    for (key, opts) in files {
        let bytes = compile(opts)?;
        debug!("Compiled {} ({} bytes)", key, bytes.len());
        out.insert(key.clone(), bytes);
    }
    Ok(out)
}

/// Build the file model without rendering it.
pub fn build_file(opts: &CreateOptions) -> ConfigResult<HclFile> {
    let attributes = from_json_map(&opts.attributes)?;

    let mut blocks = Vec::new();

    if let Some(tf) = &opts.terraform_options {
        blocks.push(terraform_block(tf));
    }

    let providers = match &opts.provider_options {
        Some(p) => provider_blocks(p)?,
        None => Vec::new(),
    };

    let modules = match &opts.module_options {
        Some(m) => m
            .module_configs
            .iter()
            .map(|mc| module_block(mc, &providers))
            .collect::<ConfigResult<Vec<_>>>()?,
        None => Vec::new(),
    };

    blocks.extend(providers);
    blocks.extend(modules);

    if let Some(v) = &opts.variable_options {
        blocks.extend(variable_blocks(v));
    }

    blocks.extend(opts.output_options.iter().map(output_block));

    for block in &blocks {
        block.validate()?;
    }

    Ok(HclFile::new(attributes, blocks))
}

fn terraform_block(opts: &TerraformOptions) -> Block {
    let mut terraform = Block::new(BlockType::Terraform);

    if !opts.provider_requirements.is_empty() {
        let mut required = Block::new(BlockType::RequiredProviders);
        for (name, requirement) in &opts.provider_requirements {
            let mut entries = BTreeMap::new();
            if !requirement.version_constraints.is_empty() {
                entries.insert(
                    "version".to_string(),
                    Value::String(requirement.version_constraints.join(",")),
                );
            }
            if let Some(source) = requirement.source.as_ref().filter(|s| !s.is_empty()) {
                entries.insert("source".to_string(), Value::String(source.clone()));
            }
            required = required.attribute(name.clone(), Value::Object(entries));
        }
        terraform = terraform.child(required);
    }

    let backend = Block::new(BlockType::Backend)
        .label("http")
        .attribute("address", opts.address.clone())
        .attribute("username", BACKEND_USERNAME)
        .attribute("password", opts.token.clone())
        .attribute("skip_cert_verification", opts.skip_tls_verify)
        .attribute("update_method", BACKEND_UPDATE_METHOD)
        .attribute("retry_max", BACKEND_RETRY_MAX)
        .attribute("retry_wait_max", BACKEND_RETRY_WAIT_MAX);

    terraform.child(backend)
}

/// Build a module block, injecting `source` and provider aliases.
pub fn module_block(mc: &ModuleConfig, providers: &[Block]) -> ConfigResult<Block> {
    let mut attributes = from_json_map(&mc.attributes)?;
    attributes.insert("source".to_string(), Value::String(mc.source.clone()));

    let mut providers_map = BTreeMap::new();
    for required in &mc.schema_data.required_providers {
        let matched = providers
            .iter()
            .filter(|p| p.name() == Some(required.name.as_str()))
            .find_map(block_alias);

        match matched {
            Some(alias) => {
                providers_map.insert(
                    required.name.clone(),
                    Value::expression(format!("{}.{}", required.name, alias)),
                );
            }
            None => warn!(
                "Module {} requires provider {} but no connector provides it",
                mc.name, required.name
            ),
        }
    }

    if !providers_map.is_empty() {
        attributes.insert("providers".to_string(), Value::Object(providers_map));
    }

    Ok(Block::new(BlockType::Module)
        .label(mc.name.clone())
        .attributes(attributes))
}

fn variable_blocks(opts: &VariableOptions) -> Vec<Block> {
    let variables = opts
        .variables
        .iter()
        .map(|(name, sensitive)| (format!("{}{}", opts.variable_prefix, name), *sensitive));
    let outputs = opts
        .dependency_outputs
        .iter()
        .map(|(name, o)| (format!("{}{}", opts.resource_prefix, name), o.sensitive));
    let connectors = opts.connector_variables.iter().map(|name| (name.clone(), true));

    variables
        .chain(outputs)
        .chain(connectors)
        .map(|(label, sensitive)| {
            Block::new(BlockType::Variable)
                .label(label)
                .attribute("type", Value::expression("string"))
                .attribute("sensitive", sensitive)
        })
        .collect()
}

fn output_block(o: &Output) -> Block {
    Block::new(BlockType::Output)
        .label(format!("{}_{}", o.resource_name, o.name))
        .attribute("sensitive", o.sensitive)
        .attribute(
            "value",
            Value::expression(format!("module.{}.{}", o.resource_name, o.name)),
        )
}
