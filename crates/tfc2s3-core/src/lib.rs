//! tfc2s3 Core Library
//!
//! Configuration rewriting, module version checks, the external operation
//! adapter and the shared domain model for moving Terraform state from
//! Terraform Cloud to an S3 backend.

pub mod config;
pub mod domain;
pub mod fakes;
pub mod mutator;
pub mod obs;
pub mod ops;
pub mod redact;
pub mod reporting;
pub mod rewrite;
pub mod telemetry;
pub mod validation;
pub mod version;

pub use config::{MigrationConfig, OperationTimeouts};

pub use domain::{
    format_duration, MigrationError, MigrationRequest, MigrationResult, ObjectStoreSettings,
    RepositoryTarget, Result, ResultAccumulator, RunSummary, SkipFlags, StepRecord,
    ValidationError,
};

pub use mutator::{BackendReport, ModuleReport, RepositoryMutator, VersionReport};

pub use obs::{pipeline_span, run_span, ProgressReporter, TracingReporter};

pub use ops::{
    BranchOutcome, CloneOutcome, CommandOutput, CommandRunner, CommandSpec, CommitOutcome,
    FailureKind, IntegrityReport, OperationAdapter, OperationError, PlanStatus, ProcessRunner,
    PullRequestSpec, StateLocation,
};

pub use redact::{RedactionRule, Redactor};

pub use reporting::{render_summary, write_report_json, MigrationReport};

pub use rewrite::{
    inject_workflow_secret, rewrite_backend_block, rewrite_module_sources, state_key,
    BackendTarget, ConfigFile, SourceRewriteOptions, WorkflowSecret,
};

pub use telemetry::{init_tracing, TelemetryGuard, TelemetryOptions};

pub use validation::{
    find_scripts_path, parse_repository_list, probe_environment, validate_repository_name,
    validate_targets, EnvironmentReport,
};

pub use version::{
    compare, parse_version, validate_module_versions, validate_module_versions_with, Version,
    VersionRequirement, VersionRequirements,
};
