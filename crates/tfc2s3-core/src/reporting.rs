use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::Result;
use crate::domain::{format_duration, MigrationResult, RunSummary};

/// Full record of a run, written with `--report`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// In completion order.
    pub results: Vec<MigrationResult>,
    pub summary: RunSummary,
}

impl MigrationReport {
    pub fn failures(&self) -> impl Iterator<Item = &MigrationResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Rollback guidance applies only to real runs with at least one failure.
    pub fn needs_rollback(&self) -> bool {
        !self.dry_run && !self.summary.all_succeeded()
    }
}

/// Write the report in pretty JSON format.
pub fn write_report_json(path: &Path, report: &MigrationReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Read a report written by [`write_report_json`].
pub fn read_report_json(path: &Path) -> Result<MigrationReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

const ROLLBACK_STEPS: [&str; 4] = [
    "Close the migration pull request without merging; the default branch still uses Terraform Cloud.",
    "Delete the migration branch: git push origin --delete <branch>",
    "Remove any partially copied state object from the S3 bucket.",
    "Re-run the migration for the failed repositories once the cause is fixed.",
];

/// Plain-text summary printed at the end of a run.
pub fn render_summary(report: &MigrationReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    out.push_str("Migration Summary\n");
    out.push_str("=================\n");
    if report.dry_run {
        out.push_str("Mode: DRY RUN (no changes made)\n");
    }
    out.push_str(&format!(
        "Total: {}\nSuccessful: {}\nFailed: {}\nDuration: {}\n",
        summary.total,
        summary.successful,
        summary.failed,
        format_duration(summary.duration())
    ));

    let successes: Vec<_> = report.results.iter().filter(|r| r.success).collect();
    if !successes.is_empty() {
        out.push_str("\nSuccessful repositories:\n");
        for result in successes {
            out.push_str(&format!("  + {}", result.repository));
            if !result.warnings.is_empty() {
                out.push_str(&format!(" ({} warnings)", result.warnings.len()));
            }
            out.push('\n');
        }
    }

    let mut failures = report.failures().peekable();
    if failures.peek().is_some() {
        out.push_str("\nFailed repositories:\n");
        for result in failures {
            out.push_str(&format!("  - {}\n", result.repository));
            for error in &result.errors {
                out.push_str(&format!("      {error}\n"));
            }
        }
    }

    if report.needs_rollback() {
        out.push_str("\nRollback instructions:\n");
        for (i, step) in ROLLBACK_STEPS.iter().enumerate() {
            out.push_str(&format!("  {}. {step}\n", i + 1));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepRecord;
    use std::time::Duration;

    fn report(dry_run: bool) -> MigrationReport {
        let ok = MigrationResult {
            repository: "repo-a".to_string(),
            success: true,
            steps_completed: StepRecord::ALL.to_vec(),
            errors: vec![],
            warnings: vec!["state verification failed".to_string()],
            duration_ms: 1200,
        };
        let failed = MigrationResult::failed("repo-b", "push: rejected");
        let results = vec![ok, failed];
        let summary = RunSummary::from_results(&results, Duration::from_secs(125));
        MigrationReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run,
            results,
            summary,
        }
    }

    #[test]
    fn test_render_summary_lists_failures_and_rollback() {
        let text = render_summary(&report(false));
        assert!(text.contains("Total: 2"));
        assert!(text.contains("Duration: 2m 5s"));
        assert!(text.contains("+ repo-a (1 warnings)"));
        assert!(text.contains("- repo-b"));
        assert!(text.contains("push: rejected"));
        assert!(text.contains("Rollback instructions"));
    }

    #[test]
    fn test_dry_run_summary_has_no_rollback() {
        let text = render_summary(&report(true));
        assert!(text.contains("DRY RUN"));
        assert!(!text.contains("Rollback instructions"));
    }

    #[test]
    fn test_write_report_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let original = report(false);
        write_report_json(&path, &original).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"steps_completed\""));
        assert!(raw.contains("\"copy_state\""));
        assert_eq!(read_report_json(&path).unwrap(), original);
    }
}
