//! External operation failures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Coarse classification of an [`OperationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    NotFound,
    NonZeroExit,
    Spawn,
    MissingWorkingDirectory,
    MissingFile,
    MalformedOutput,
    Io,
}

/// Why an external operation failed.
///
/// Command strings and captured output held here have already been
/// redacted when the error comes out of [`super::OperationAdapter`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("executable not found: {program}")]
    NotFound { program: String },

    #[error("`{command}` exited with code {exit_code}: {output}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("working directory does not exist: {}", .path.display())]
    MissingWorkingDirectory { path: PathBuf },

    #[error("required file missing: {}", .path.display())]
    MissingFile { path: PathBuf },

    #[error("unexpected output from `{command}`: {reason}")]
    MalformedOutput { command: String, reason: String },

    #[error("io error while {context}: {reason}")]
    Io { context: String, reason: String },
}

impl OperationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            OperationError::Timeout { .. } => FailureKind::Timeout,
            OperationError::NotFound { .. } => FailureKind::NotFound,
            OperationError::NonZeroExit { .. } => FailureKind::NonZeroExit,
            OperationError::Spawn { .. } => FailureKind::Spawn,
            OperationError::MissingWorkingDirectory { .. } => FailureKind::MissingWorkingDirectory,
            OperationError::MissingFile { .. } => FailureKind::MissingFile,
            OperationError::MalformedOutput { .. } => FailureKind::MalformedOutput,
            OperationError::Io { .. } => FailureKind::Io,
        }
    }

    pub fn io(context: impl Into<String>, err: &std::io::Error) -> Self {
        OperationError::Io {
            context: context.into(),
            reason: err.to_string(),
        }
    }

    /// Apply `f` to every free-text field.
    pub fn map_text(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            OperationError::Timeout {
                command,
                timeout_secs,
            } => OperationError::Timeout {
                command: f(&command),
                timeout_secs,
            },
            OperationError::NonZeroExit {
                command,
                exit_code,
                output,
            } => OperationError::NonZeroExit {
                command: f(&command),
                exit_code,
                output: f(&output),
            },
            OperationError::Spawn { command, reason } => OperationError::Spawn {
                command: f(&command),
                reason: f(&reason),
            },
            OperationError::MalformedOutput { command, reason } => {
                OperationError::MalformedOutput {
                    command: f(&command),
                    reason: f(&reason),
                }
            }
            OperationError::Io { context, reason } => OperationError::Io {
                context: f(&context),
                reason: f(&reason),
            },
            other => other,
        }
    }
}
