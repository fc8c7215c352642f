//! Input validation and pre-flight checks.
//!
//! Repository names are filtered (bad names are dropped, not fatal), the
//! scripts directory is located, and the required tools are probed before
//! any pipeline starts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::STATE_COPY_SCRIPT;
use crate::domain::error::{MigrationError, Result, ValidationError};
use crate::domain::request::RepositoryTarget;
use crate::ops::{CommandRunner, CommandSpec};
use crate::redact::Redactor;

/// Tools every non-skipped run needs on `PATH`.
pub const REQUIRED_TOOLS: [&str; 4] = ["aws", "terraform", "gh", "git"];

const FORBIDDEN_CHARS: [char; 5] = [';', '&', '|', '`', '$'];

/// Batch sizes above this are accepted with a warning.
pub const MAX_RECOMMENDED_BATCH_SIZE: usize = 10;

/// Split a comma-separated list, trimming whitespace and dropping blanks.
pub fn parse_repository_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reject names that are empty, traverse paths, carry shell metacharacters
/// or control characters, or use anything outside `[A-Za-z0-9_.-]`.
pub fn validate_repository_name(name: &str) -> std::result::Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.contains("..") {
        return Err(ValidationError::PathTraversal {
            name: name.to_string(),
        });
    }
    if let Some(character) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(ValidationError::ForbiddenCharacter {
            name: name.to_string(),
            character,
        });
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacter {
            name: name.to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ValidationError::InvalidFormat {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Names that failed validation, with the reason.
pub type Rejected = Vec<(String, ValidationError)>;

/// Valid, de-duplicated targets under `work_dir`, in input order, plus the
/// rejected names. A repeated name keeps its first occurrence.
pub fn validate_targets(names: &[String], work_dir: &Path) -> (Vec<RepositoryTarget>, Rejected) {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut rejected = Vec::new();

    for name in names {
        match validate_repository_name(name) {
            Ok(()) if !seen.insert(name.as_str()) => {
                warn!(repo = %name, "duplicate repository name ignored");
            }
            Ok(()) => targets.push(RepositoryTarget::new(name.as_str(), work_dir)),
            Err(e) => {
                warn!(repo = %name.escape_debug(), error = %e, "invalid repository name skipped");
                rejected.push((name.clone(), e));
            }
        }
    }

    (targets, rejected)
}

/// Reject a zero batch size; warn when it exceeds
/// [`MAX_RECOMMENDED_BATCH_SIZE`].
pub fn validate_batch_size(batch_size: usize) -> std::result::Result<usize, ValidationError> {
    if batch_size == 0 {
        return Err(ValidationError::BatchSize(batch_size));
    }
    if batch_size > MAX_RECOMMENDED_BATCH_SIZE {
        warn!(
            batch_size,
            max = MAX_RECOMMENDED_BATCH_SIZE,
            "batch size exceeds recommended maximum"
        );
    }
    Ok(batch_size)
}

/// Check that `dir` exists and holds the state copy script.
pub fn validate_scripts_path(dir: &Path) -> std::result::Result<PathBuf, ValidationError> {
    let err = |reason: &str| ValidationError::ScriptsPath {
        path: dir.display().to_string(),
        reason: reason.to_string(),
    };
    if !dir.is_dir() {
        return Err(err("not a directory"));
    }
    if !dir.join(STATE_COPY_SCRIPT).is_file() {
        return Err(err(&format!("{STATE_COPY_SCRIPT} not found")));
    }
    Ok(dir.to_path_buf())
}

/// The explicit directory when given, otherwise the first candidate that
/// passes [`validate_scripts_path`].
pub fn find_scripts_path(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> std::result::Result<PathBuf, ValidationError> {
    if let Some(dir) = explicit {
        return validate_scripts_path(dir);
    }
    candidates
        .iter()
        .find_map(|dir| validate_scripts_path(dir).ok())
        .ok_or_else(|| ValidationError::ScriptsPath {
            path: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            reason: format!("no candidate contains {STATE_COPY_SCRIPT}"),
        })
}

/// Tool versions found and credential warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub tools: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

/// Probe the required tools and credentials.
///
/// A missing or broken tool is an `Environment` error. Credential checks
/// only produce warnings.
pub async fn probe_environment(
    runner: &dyn CommandRunner,
    redactor: &Redactor,
    timeout: Duration,
    aws_profile: &str,
) -> Result<EnvironmentReport> {
    let mut report = EnvironmentReport::default();
    let mut missing = Vec::new();

    for tool in REQUIRED_TOOLS {
        let spec = CommandSpec::new(tool, timeout).arg("--version");
        match runner.run(&spec).await {
            Ok(out) if out.succeeded => {
                let version = redactor.redact(out.stdout.lines().next().unwrap_or_default().trim());
                info!(tool, version = %version, "found tool");
                report.tools.push((tool.to_string(), version));
            }
            Ok(out) => missing.push(format!("{tool} (exit code {:?})", out.exit_code)),
            Err(e) => missing.push(format!("{tool} ({})", redactor.redact(&e.to_string()))),
        }
    }

    if !missing.is_empty() {
        return Err(MigrationError::Environment(format!(
            "required tools unavailable: {}",
            missing.join(", ")
        )));
    }

    let checks = [
        (
            "AWS credentials",
            CommandSpec::new("aws", timeout).args(["sts", "get-caller-identity", "--profile", aws_profile]),
        ),
        (
            "GitHub authentication",
            CommandSpec::new("gh", timeout).args(["auth", "status"]),
        ),
    ];
    for (label, spec) in checks {
        let ok = matches!(runner.run(&spec).await, Ok(out) if out.succeeded);
        if !ok {
            let message = format!("{label} check failed (`{}`)", spec.display());
            warn!(check = label, "credential check failed");
            report.warnings.push(redactor.redact(&message));
        }
    }

    Ok(report)
}
