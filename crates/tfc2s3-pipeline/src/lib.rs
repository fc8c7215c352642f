//! tfc2s3 Pipeline - per-repository migration and run scheduling
//!
//! Provides:
//! - The twelve-step pipeline that moves one repository off Terraform Cloud
//! - A commit approval seam for interactive confirmation
//! - A scheduler that runs pipelines with bounded concurrency and isolates
//!   failures between repositories

pub mod approval;
pub mod executor;
pub mod scheduler;
pub mod step;

// Re-export key types
pub use approval::{AutoApprove, CommitApproval, DenyAll};
pub use executor::PipelineExecutor;
pub use scheduler::{MigrationScheduler, RepositoryPipeline};
pub use step::{label, planned_steps, StepPolicy};
