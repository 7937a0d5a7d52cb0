//! # walrus_config
//!
//! Terraform configuration compiler for walrus resource runs.
//!
//! This crate turns a module reference, its attribute values, required
//! providers, connector credentials, environment variables and upstream
//! outputs into the files a run executes.
//!
//! ## Features
//!
//! - Tagged value representation of attribute data
//! - Backend, provider, module, variable and output blocks
//! - Deterministic `terraform fmt` style rendering
//! - Rewriting of `${var.*}` and `${res.*}` references into generated variables
//!
//! ## Example
//!
//! ```rust
//! use walrus_config::{compile, CreateOptions, Output};
//!
//! let opts = CreateOptions {
//!     output_options: vec![Output::new("web", "endpoint")],
//!     ..Default::default()
//! };
//!
//! let main_tf = compile(&opts).unwrap();
//! assert!(String::from_utf8(main_tf).unwrap().contains("module.web.endpoint"));
//! ```

pub mod block;
pub mod bundle;
pub mod compiler;
pub mod error;
pub mod interpolation;
pub mod options;
pub mod provider;
pub mod value;
pub mod writer;

pub use block::{Block, BlockType};
pub use bundle::{compile_run, vars_options, CompiledRun, RunConfigInput, VariableValue};
pub use compiler::{build_file, compile, compile_files, file_name, module_block, FILE_MAIN, FILE_VARS};
pub use error::{ConfigError, ConfigResult};
pub use interpolation::{mark_sensitive_outputs, Interpolated, Interpolator, OutputRef};
pub use options::{
    Connector, ConnectorConfigEntry, CreateOptions, ModuleConfig, ModuleOptions, Output,
    OutputValue, ProviderOptions, ProviderRequirement, RequiredProvider, SchemaData,
    TerraformOptions, VariableOptions, CONNECTOR_PREFIX, CONNECTOR_SEPARATOR, CONNECTOR_TYPE_KUBERNETES,
    RESOURCE_PREFIX, VARIABLE_PREFIX,
};
pub use provider::{connector_secrets, provider_alias, provider_blocks};
pub use value::Value;
pub use writer::HclFile;
