//! Structured observability hooks for migration runs.
//!
//! This module provides:
//! - Run and pipeline tracing spans
//! - Emission functions for lifecycle events: run start/finish, pipeline
//!   start/finish, step transitions and warnings
//! - The `ProgressReporter` capability injected into pipelines and the
//!   scheduler, with `TracingReporter` as the production implementation
//!
//! Events are emitted at `info!` level with an `event` field so they can be
//! filtered with `RUST_LOG` or picked out of JSON output.

use tracing::{info, warn};

use crate::domain::{MigrationResult, RunSummary, StepRecord};

/// Span covering a whole run; every pipeline span nests inside it.
///
/// # Example
///
/// ```ignore
/// scheduler_future.instrument(run_span("2f1c...")).await;
/// // every event below carries run_id = "2f1c..."
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("tfc2s3.run", run_id = %run_id)
}

/// Span covering one repository's pipeline.
pub fn pipeline_span(repo: &str) -> tracing::Span {
    tracing::info_span!("tfc2s3.pipeline", repo = %repo)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, repositories: usize, batch_size: usize, dry_run: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        repositories = repositories,
        batch_size = batch_size,
        dry_run = dry_run,
    );
}

/// Emit event: run finished with totals.
pub fn emit_run_finished(summary: &RunSummary) {
    info!(
        event = "run.finished",
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        duration_ms = summary.duration_ms,
    );
}

/// Emit event: a step began.
pub fn emit_step_started(repo: &str, step: StepRecord) {
    info!(
        event = "step.started",
        repo = %repo,
        step = %step,
        "[{}/{}] {}",
        step.number(),
        StepRecord::ALL.len(),
        step
    );
}

/// Emit event: a step finished and was recorded.
pub fn emit_step_completed(repo: &str, step: StepRecord) {
    info!(event = "step.completed", repo = %repo, step = %step);
}

/// Emit event: a step was skipped by configuration.
pub fn emit_step_skipped(repo: &str, step: StepRecord, reason: &str) {
    info!(event = "step.skipped", repo = %repo, step = %step, reason = %reason);
}

/// Emit event: a non-fatal problem (warning level).
pub fn emit_warning(repo: &str, message: &str) {
    warn!(event = "pipeline.warning", repo = %repo, message = %message);
}

/// Emit event: a fatal step failure (warning level; the run continues).
pub fn emit_step_failed(repo: &str, step: StepRecord, error: &str) {
    warn!(event = "step.failed", repo = %repo, step = %step, error = %error);
}

/// Emit event: a pipeline produced its result.
pub fn emit_pipeline_finished(result: &MigrationResult) {
    info!(
        event = "pipeline.finished",
        repo = %result.repository,
        success = result.success,
        steps = result.steps_completed.len(),
        warnings = result.warnings.len(),
        errors = result.errors.len(),
        duration_ms = result.duration_ms,
    );
}

/// Progress callbacks for a run.
///
/// Implementations must tolerate calls from concurrently running
/// pipelines.
pub trait ProgressReporter: Send + Sync {
    fn run_started(&self, run_id: &str, repositories: usize, batch_size: usize, dry_run: bool);
    fn step_started(&self, repo: &str, step: StepRecord);
    fn step_completed(&self, repo: &str, step: StepRecord);
    fn step_skipped(&self, repo: &str, step: StepRecord, reason: &str);
    fn step_failed(&self, repo: &str, step: StepRecord, error: &str);
    fn warning(&self, repo: &str, message: &str);
    fn pipeline_finished(&self, result: &MigrationResult);
    fn run_finished(&self, summary: &RunSummary);
}

/// Reporter that emits the structured events above.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn run_started(&self, run_id: &str, repositories: usize, batch_size: usize, dry_run: bool) {
        emit_run_started(run_id, repositories, batch_size, dry_run);
    }

    fn step_started(&self, repo: &str, step: StepRecord) {
        emit_step_started(repo, step);
    }

    fn step_completed(&self, repo: &str, step: StepRecord) {
        emit_step_completed(repo, step);
    }

    fn step_skipped(&self, repo: &str, step: StepRecord, reason: &str) {
        emit_step_skipped(repo, step, reason);
    }

    fn step_failed(&self, repo: &str, step: StepRecord, error: &str) {
        emit_step_failed(repo, step, error);
    }

    fn warning(&self, repo: &str, message: &str) {
        emit_warning(repo, message);
    }

    fn pipeline_finished(&self, result: &MigrationResult) {
        emit_pipeline_finished(result);
    }

    fn run_finished(&self, summary: &RunSummary) {
        emit_run_finished(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pipeline_span_nests_in_run_span() {
        let run = run_span("test-run-001");
        let _entered = run.enter();
        let _pipeline = pipeline_span("repo-a").entered();
    }

    #[test]
    fn test_emit_functions_do_not_panic() {
        let reporter = TracingReporter;
        reporter.run_started("run", 2, 1, true);
        reporter.step_started("repo-a", StepRecord::Clone);
        reporter.step_completed("repo-a", StepRecord::Clone);
        reporter.step_skipped("repo-a", StepRecord::Validate, "disabled");
        reporter.warning("repo-a", "verification failed");
        reporter.step_failed("repo-a", StepRecord::Push, "rejected");
        let result = MigrationResult::failed("repo-a", "rejected");
        reporter.pipeline_finished(&result);
        reporter.run_finished(&RunSummary::from_results(&[result], Duration::ZERO));
    }
}
