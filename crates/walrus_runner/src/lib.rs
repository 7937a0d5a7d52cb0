//! # walrus_runner
//!
//! Scheduling boundary for walrus deployment runs.
//!
//! A run is executed as a batch job that mounts a secret holding the
//! compiled configuration. This crate defines that workload, the
//! [`JobScheduler`] trait the controller talks to, and two schedulers.
//!
//! # Features
//!
//! - **Docker Scheduler**: Runs jobs as local containers (bollard)
//! - **Mock Scheduler**: In-memory jobs, pods and logs for testing
//! - **Job Contract**: Secret/job naming, labels and deployer command
//!
//! # Example
//!
//! ```rust,no_run
//! use walrus_runner::{DockerScheduler, JobConfig, JobScheduler, JobType, Secret};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scheduler = DockerScheduler::new().await?;
//!     let config = JobConfig::default();
//!
//!     let spec = config.job_spec(JobType::Apply, "run-1");
//!     scheduler
//!         .create_secret(&Secret::new(spec.secret_name.clone()).file("main.tf", "terraform {}"))
//!         .await?;
//!     let job = scheduler.create_job(&spec).await?;
//!     println!("Started {}", job.name);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod docker;
pub mod error;
pub mod mock;
pub mod model;
pub mod scheduler;

pub use config::{
    job_name, secret_name, JobConfig, JobType, DEFAULT_IMAGE, DEFAULT_SECRET_MOUNT_PATH,
    DEFAULT_WORKDIR, JOB_TYPE_LABEL, RUN_LABEL,
};
pub use docker::DockerScheduler;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockScheduler};
pub use model::{Job, JobSpec, LogOptions, Pod, PodPhase, Secret};
pub use scheduler::{JobScheduler, LogStream};
