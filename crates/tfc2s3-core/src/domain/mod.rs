//! Domain model: requests, results and errors.

pub mod error;
pub mod request;
pub mod result;

pub use error::{MigrationError, Result, ValidationError};
pub use request::{MigrationRequest, ObjectStoreSettings, RepositoryTarget, SkipFlags};
pub use result::{format_duration, MigrationResult, ResultAccumulator, RunSummary, StepRecord};
