//! The twelve pipeline steps and how each one treats failure.

use serde::{Deserialize, Serialize};
use tfc2s3_core::{SkipFlags, StepRecord};

/// What a failing step does to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    /// Failure records an error and stops the pipeline.
    Fatal,

    /// Failure records a warning and the pipeline continues.
    BestEffort,

    /// May be turned off by configuration; problems are warnings.
    Skippable,
}

impl StepPolicy {
    pub fn of(step: StepRecord) -> Self {
        match step {
            StepRecord::Validate => StepPolicy::Skippable,
            StepRecord::Verify => StepPolicy::BestEffort,
            _ => StepPolicy::Fatal,
        }
    }
}

/// Human-readable action for progress output.
pub fn title(step: StepRecord) -> &'static str {
    match step {
        StepRecord::Clone => "Cloning repository",
        StepRecord::Branch => "Creating migration branch",
        StepRecord::Validate => "Validating module versions",
        StepRecord::CopyState => "Copying Terraform state from Cloud to S3",
        StepRecord::Backend => "Updating backend configuration",
        StepRecord::Modules => "Converting module sources to Git format",
        StepRecord::Workflows => "Updating GitHub Actions workflows",
        StepRecord::Commit => "Committing changes",
        StepRecord::Push => "Pushing migration branch",
        StepRecord::Pr => "Creating pull request",
        StepRecord::Verify => "Verifying state in S3",
        StepRecord::Complete => "Migration complete",
    }
}

/// `[4/12] Copying Terraform state from Cloud to S3`
pub fn label(step: StepRecord) -> String {
    format!("[{}/{}] {}", step.number(), StepRecord::ALL.len(), title(step))
}

/// Steps a pipeline will attempt, in order, given the skip flags.
pub fn planned_steps(skip: &SkipFlags) -> Vec<StepRecord> {
    StepRecord::ALL
        .into_iter()
        .filter(|step| !(skip.version_check && *step == StepRecord::Validate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_validate_and_verify_are_non_fatal() {
        let non_fatal: Vec<_> = StepRecord::ALL
            .into_iter()
            .filter(|s| StepPolicy::of(*s) != StepPolicy::Fatal)
            .collect();
        assert_eq!(non_fatal, vec![StepRecord::Validate, StepRecord::Verify]);
    }

    #[test]
    fn test_label_numbers_steps() {
        assert_eq!(label(StepRecord::Clone), "[1/12] Cloning repository");
        assert_eq!(label(StepRecord::Complete), "[12/12] Migration complete");
    }

    #[test]
    fn test_planned_steps_drop_skipped_validation() {
        assert_eq!(planned_steps(&SkipFlags::default()).len(), 12);

        let skip = SkipFlags {
            version_check: true,
            ..SkipFlags::default()
        };
        let planned = planned_steps(&skip);
        assert_eq!(planned.len(), 11);
        assert!(!planned.contains(&StepRecord::Validate));
    }
}
