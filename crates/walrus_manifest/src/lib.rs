//! # walrus_manifest
//!
//! Client side of walrus: load declared objects from YAML manifests, push
//! them to the server and wait for them to settle.
//!
//! # Features
//!
//! - **Loader**: YAML files or directories, scope defaulted from the server context
//! - **Operator**: apply, preview and delete with exponential backoff on conflicts
//! - **Waiter**: watch events until objects are ready, failed or deleted
//! - **API clients**: reqwest over HTTP with server-sent events, and an in-memory mock
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use walrus_core::SystemClock;
//! use walrus_manifest::{ClientConfig, HttpApiClient, ObjectLoader, Operator, Waiter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://walrus.local")
//!         .with_token("token")
//!         .with_scope("default", "dev");
//!     let set = ObjectLoader::new(&config).load_files(&[PathBuf::from("walrus.yaml")], false)?;
//!
//!     let client = Arc::new(HttpApiClient::new(config)?);
//!     let result = Operator::new(client.clone(), Arc::new(SystemClock)).apply(set.clone()).await;
//!     for line in result.messages(true) {
//!         println!("{}", line);
//!     }
//!
//!     Waiter::for_status(client, Duration::from_secs(300))
//!         .wait(&set, &result.unchanged)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod loader;
pub mod mock;
pub mod object;
pub mod operator;
pub mod waiter;

pub use client::{decode_events, ApiClient, Event, EventItem, EventStream, ItemStatus};
pub use config::{BackoffConfig, ClientConfig, WaitConfig};
pub use error::{check_status, status_error, ManifestError, ManifestResult};
pub use http::HttpApiClient;
pub use loader::ObjectLoader;
pub use mock::{CapturedCall, MockApiClient};
pub use object::{singular, Object, ObjectScope, ObjectSet, ObjectStatus, GROUP_RESOURCES, GROUP_SEQUENCE};
pub use operator::{merge_patch, OperateResult, Operation, Operator};
pub use waiter::{WaitCondition, Waiter};
