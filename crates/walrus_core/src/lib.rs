//! # walrus_core
//!
//! Run orchestration for walrus resources.
//!
//! A [`Deployer`] turns a resource into a pending run, compiles its
//! configuration and hands a job to a [`walrus_runner::JobScheduler`]. The
//! [`JobController`] follows that job to completion, records the outcome
//! and feeds the reported state through the [`ResourceReconciler`] so the
//! inventory of resource instances matches what was deployed.
//!
//! ## Features
//!
//! - At most one in-flight run per resource
//! - Transactional instance reconciliation with best-effort labeling
//! - Log streaming with a bounded wait for the job's pod
//! - In-memory store and injectable clock for tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use walrus_config::ModuleConfig;
//! use walrus_core::{
//!     BroadcastNotifier, DeployOptions, Deployer, DeployerConfig, MemoryStore, Resource,
//!     SystemClock,
//! };
//! use walrus_runner::MockScheduler;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let resource = Resource::new("web", "p1", "e1", ModuleConfig::new("web", "./web"));
//!     store.put_resource(resource.clone());
//!
//!     let deployer = Deployer::new(
//!         store,
//!         Arc::new(MockScheduler::new()),
//!         Arc::new(BroadcastNotifier::default()),
//!         Arc::new(SystemClock),
//!         DeployerConfig::new("https://walrus.local", "token"),
//!     );
//!
//!     let run = deployer.apply(&resource.id, &DeployOptions::default()).await?;
//!     println!("Run {} is {:?}", run.id, run.status);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod deployer;
pub mod error;
pub mod job_controller;
pub mod labeler;
pub mod models;
pub mod notifier;
pub mod reconciler;
pub mod store;
pub mod sweep;

pub use clock::{Clock, FakeClock, SystemClock};
pub use deployer::{DeployOptions, Deployer, DeployerConfig};
pub use error::{CoreError, CoreResult, MultiError};
pub use job_controller::{JobController, JobControllerConfig};
pub use labeler::{Labeler, NoopLabeler};
pub use models::{Resource, Run, RunStatus, RunType};
pub use notifier::{BroadcastNotifier, Notifier, RunEvent};
pub use reconciler::{ReconcileReport, ResourceReconciler};
pub use store::{MemoryStore, Store, Tx};
pub use sweep::{sweep_in_buckets, ResourceStatusSyncer};
