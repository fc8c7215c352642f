//! Domain-level error taxonomy for tfc2s3.

use crate::ops::OperationError;

/// Reasons a repository name or run parameter is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("repository name must not be empty")]
    EmptyName,

    #[error("repository name {name:?} contains a path traversal sequence")]
    PathTraversal { name: String },

    #[error("repository name {name:?} contains forbidden character {character:?}")]
    ForbiddenCharacter { name: String, character: char },

    #[error("repository name {name:?} contains control characters")]
    ControlCharacter { name: String },

    #[error("repository name {name:?} may only contain letters, digits, '.', '_' and '-'")]
    InvalidFormat { name: String },

    #[error("batch size must be at least 1, got {0}")]
    BatchSize(usize),

    #[error("scripts path {path}: {reason}")]
    ScriptsPath { path: String, reason: String },
}

/// tfc2s3 domain errors.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("external operation failed: {0}")]
    ExternalOperation(#[from] OperationError),

    #[error("cannot transform {path}: {reason}")]
    Transform { path: String, reason: String },

    /// A confirmation was refused; names what was skipped.
    #[error("User skipped {0}")]
    UserDeclined(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tfc2s3 domain operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
