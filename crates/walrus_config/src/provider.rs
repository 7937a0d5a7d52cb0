//! Provider blocks derived from connectors.

use std::collections::BTreeMap;

use tracing::debug;

use crate::block::{Block, BlockType};
use crate::error::{ConfigError, ConfigResult};
use crate::options::{Connector, ProviderOptions};
use crate::value::Value;

const PROVIDER_KUBERNETES: &str = "kubernetes";
const PROVIDER_KUBECTL: &str = "kubectl";
const PROVIDER_HELM: &str = "helm";

/// Alias of the provider block generated for a connector.
pub fn provider_alias(provider: &str, separator: &str, connector_id: &str) -> String {
    format!("{}{}{}", provider, separator, connector_id)
}

/// Build one provider block per required provider and matching connector.
///
/// Blocks are ordered by provider name, then by connector id.
pub fn provider_blocks(opts: &ProviderOptions) -> ConfigResult<Vec<Block>> {
    let mut names = opts.required_provider_names.clone();
    names.sort();
    names.dedup();

    let mut connectors: Vec<&Connector> = opts.connectors.iter().collect();
    connectors.sort_by(|a, b| a.id.cmp(&b.id));

    for connector in &connectors {
        if connector.id.is_empty() {
            return Err(ConfigError::InvalidConnector {
                id: connector.id.clone(),
                reason: "empty id".to_string(),
            });
        }
        if connector.id.contains(&opts.connector_separator) {
            return Err(ConfigError::InvalidConnector {
                id: connector.id.clone(),
                reason: format!("id contains separator {:?}", opts.connector_separator),
            });
        }
    }

    let mut blocks = Vec::new();
    for name in &names {
        for connector in &connectors {
            if let Some(block) = provider_block(name, connector, opts) {
                blocks.push(block);
            }
        }
    }

    debug!("Generated {} provider blocks", blocks.len());
    Ok(blocks)
}

fn provider_block(name: &str, connector: &Connector, opts: &ProviderOptions) -> Option<Block> {
    let alias = provider_alias(name, &opts.connector_separator, &connector.id);
    let base = Block::new(BlockType::Provider)
        .label(name)
        .attribute("alias", alias);

    if connector.is_kubernetes() {
        let config_path = format!(
            "{}/{}",
            opts.secret_mount_path.trim_end_matches('/'),
            connector.secret_file_name()
        );

        return match name {
            PROVIDER_KUBERNETES | PROVIDER_KUBECTL => Some(base.attribute("config_path", config_path)),
            PROVIDER_HELM => Some(
                base.child(
                    Block::new(BlockType::Custom(PROVIDER_KUBERNETES.to_string()))
                        .attribute("config_path", config_path),
                ),
            ),
            _ => None,
        };
    }

    if !connector.connector_type.eq_ignore_ascii_case(name) {
        return None;
    }

    let block = connector
        .config_data
        .iter()
        .fold(base, |block, (key, entry)| {
            let value = if entry.sensitive {
                Value::expression(format!("var.{}", connector.config_variable(key)))
            } else {
                Value::String(entry.value.clone())
            };
            block.attribute(key.clone(), value)
        });
    Some(block)
}

/// Values of the sensitive config entries referenced by provider blocks.
///
/// Keyed by variable name. Kubernetes connectors are skipped since their
/// credentials are mounted as files.
pub fn connector_secrets(opts: &ProviderOptions) -> BTreeMap<String, String> {
    let mut secrets = BTreeMap::new();
    for connector in &opts.connectors {
        let used = !connector.is_kubernetes()
            && opts
                .required_provider_names
                .iter()
                .any(|name| connector.connector_type.eq_ignore_ascii_case(name));
        if !used {
            continue;
        }
        for (key, entry) in connector.config_data.iter().filter(|(_, e)| e.sensitive) {
            secrets.insert(connector.config_variable(key), entry.value.clone());
        }
    }
    secrets
}

/// Alias attribute of a provider block, if present.
pub fn block_alias(block: &Block) -> Option<&str> {
    match block.attributes.get("alias") {
        Some(Value::String(alias)) => Some(alias),
        _ => None,
    }
}
