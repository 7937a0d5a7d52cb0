//! Configuration blocks.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ConfigError, ConfigResult};
use crate::value::{is_identifier, Value};

/// Block types emitted by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockType {
    Terraform,
    Backend,
    RequiredProviders,
    Provider,
    Module,
    Variable,
    Output,
    /// Any other nested block, e.g. `kubernetes` inside a helm provider.
    Custom(String),
}

impl BlockType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Terraform => "terraform",
            Self::Backend => "backend",
            Self::RequiredProviders => "required_providers",
            Self::Provider => "provider",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Output => "output",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block such as `provider "aws" { region = "us-east-1" }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub block_type: BlockType,
    pub labels: Vec<String>,
    pub attributes: BTreeMap<String, Value>,
    pub blocks: Vec<Block>,
}

impl Block {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            labels: Vec::new(),
            attributes: BTreeMap::new(),
            blocks: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attributes(mut self, attributes: BTreeMap<String, Value>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn child(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// First label, which names providers, modules, variables and outputs.
    pub fn name(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    /// Check the block and its children can be rendered.
    pub fn validate(&self) -> ConfigResult<()> {
        let ty = self.block_type.as_str();
        if ty.is_empty() || !is_identifier(ty) {
            return Err(ConfigError::InvalidBlockType(ty.to_string()));
        }
        for name in self.attributes.keys() {
            if !is_identifier(name) {
                return Err(ConfigError::InvalidAttributeName(name.clone()));
            }
        }
        self.blocks.iter().try_for_each(Block::validate)
    }
}
