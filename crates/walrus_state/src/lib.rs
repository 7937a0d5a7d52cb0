//! # walrus_state
//!
//! Reads the state a run leaves behind and turns it into the resource
//! instances walrus keeps in its inventory.
//!
//! A malformed resource never hides the others: per-resource failures are
//! collected next to the instances that did parse.

pub mod document;
pub mod error;
pub mod instance;
pub mod parser;

pub use document::{InstanceState, ResourceState, StateDocument, StateOutput};
pub use error::{StateError, StateResult};
pub use instance::{fingerprint, DeployerType, InstanceStatus, Mode, ResourceInstance};
pub use parser::{
    connector_id, instance_id, module_name, parse_outputs, ParseOptions, ParseOutcome,
    StateParser, CONNECTOR_SEPARATOR,
};
