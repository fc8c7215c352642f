//! External operations: process execution and the operation adapter.

pub mod adapter;
pub mod command;
pub mod error;

pub use adapter::{
    BranchOutcome, CloneOutcome, CommitOutcome, IntegrityReport, OperationAdapter, PlanStatus,
    PullRequestSpec, StateLocation, WORKFLOW_DIR,
};
pub use command::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use error::{FailureKind, OperationError};
