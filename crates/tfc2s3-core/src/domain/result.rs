//! Per-repository results and the run summary.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A completed pipeline step, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRecord {
    Clone,
    Branch,
    Validate,
    CopyState,
    Backend,
    Modules,
    Workflows,
    Commit,
    Push,
    Pr,
    Verify,
    Complete,
}

impl StepRecord {
    /// All steps in execution order.
    pub const ALL: [StepRecord; 12] = [
        StepRecord::Clone,
        StepRecord::Branch,
        StepRecord::Validate,
        StepRecord::CopyState,
        StepRecord::Backend,
        StepRecord::Modules,
        StepRecord::Workflows,
        StepRecord::Commit,
        StepRecord::Push,
        StepRecord::Pr,
        StepRecord::Verify,
        StepRecord::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepRecord::Clone => "clone",
            StepRecord::Branch => "branch",
            StepRecord::Validate => "validate",
            StepRecord::CopyState => "copy_state",
            StepRecord::Backend => "backend",
            StepRecord::Modules => "modules",
            StepRecord::Workflows => "workflows",
            StepRecord::Commit => "commit",
            StepRecord::Push => "push",
            StepRecord::Pr => "pr",
            StepRecord::Verify => "verify",
            StepRecord::Complete => "complete",
        }
    }

    /// 1-based position in the pipeline.
    pub fn number(&self) -> usize {
        *self as usize + 1
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final record for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub repository: String,
    pub success: bool,
    pub steps_completed: Vec<StepRecord>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl MigrationResult {
    /// A result for a pipeline that never produced its own record.
    pub fn failed(repository: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            success: false,
            steps_completed: Vec::new(),
            errors: vec![error.into()],
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn completed(&self, step: StepRecord) -> bool {
        self.steps_completed.contains(&step)
    }
}

/// Builder owned by exactly one pipeline while it runs.
#[derive(Debug)]
pub struct ResultAccumulator {
    repository: String,
    steps: Vec<StepRecord>,
    errors: Vec<String>,
    warnings: Vec<String>,
    started: Instant,
}

impl ResultAccumulator {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            steps: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Append a completed step. Steps must arrive in pipeline order.
    pub fn complete(&mut self, step: StepRecord) {
        debug_assert!(
            self.steps.last().map_or(true, |last| *last < step),
            "step {step} recorded out of order"
        );
        self.steps.push(step);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Freeze into a result. Success requires reaching `complete` with no
    /// recorded errors.
    pub fn finish(self) -> MigrationResult {
        let success =
            self.errors.is_empty() && self.steps.last() == Some(&StepRecord::Complete);
        MigrationResult {
            repository: self.repository,
            success,
            steps_completed: self.steps,
            errors: self.errors,
            warnings: self.warnings,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Aggregate over every result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn from_results(results: &[MigrationResult], elapsed: Duration) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// `0` when every repository succeeded, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// `12.3s`, `2m 5s` or `1h 3m`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let total = duration.as_secs();
        format!("{}m {}s", total / 60, total % 60)
    } else {
        let total = duration.as_secs();
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_numbers_follow_order() {
        for (i, step) in StepRecord::ALL.iter().enumerate() {
            assert_eq!(step.number(), i + 1);
        }
        assert!(StepRecord::CopyState < StepRecord::Backend);
    }

    #[test]
    fn test_step_serializes_snake_case() {
        let json = serde_json::to_string(&StepRecord::CopyState).unwrap();
        assert_eq!(json, "\"copy_state\"");
        assert_eq!(StepRecord::Pr.to_string(), "pr");
    }

    #[test]
    fn test_accumulator_success_requires_complete() {
        let mut acc = ResultAccumulator::new("repo-a");
        acc.complete(StepRecord::Clone);
        acc.warn("something odd");
        let result = acc.finish();
        assert!(!result.success);
        assert_eq!(result.warnings.len(), 1);

        let mut acc = ResultAccumulator::new("repo-a");
        for step in StepRecord::ALL {
            acc.complete(step);
        }
        assert!(acc.finish().success);
    }

    #[test]
    fn test_accumulator_errors_fail_result() {
        let mut acc = ResultAccumulator::new("repo-a");
        acc.complete(StepRecord::Clone);
        acc.error("branch failed");
        assert!(acc.has_errors());
        let result = acc.finish();
        assert!(!result.success);
        assert_eq!(result.steps_completed, vec![StepRecord::Clone]);
    }

    #[test]
    fn test_run_summary() {
        let ok = {
            let mut acc = ResultAccumulator::new("a");
            for step in StepRecord::ALL {
                acc.complete(step);
            }
            acc.finish()
        };
        let bad = MigrationResult::failed("b", "boom");
        let summary = RunSummary::from_results(&[ok, bad], Duration::from_secs(3));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), 1);

        let empty = RunSummary::from_results(&[], Duration::ZERO);
        assert_eq!(empty.exit_code(), 0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(12_340)), "12.3s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3780)), "1h 3m");
    }
}
