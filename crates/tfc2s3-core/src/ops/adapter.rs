//! Every cross-boundary action of a pipeline.
//!
//! In dry-run mode no operation invokes the runner or writes a file: actions
//! are logged and a synthetic success is returned, while existence checks
//! answer `false`. Outside dry-run each operation runs one command with the
//! timeout of its class, and all captured text is redacted before it is
//! returned or logged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::command::{CommandOutput, CommandRunner, CommandSpec};
use super::error::OperationError;
use crate::config::{OperationTimeouts, STATE_COPY_SCRIPT};
use crate::redact::Redactor;
use crate::rewrite::{inject_workflow_secret, WorkflowSecret};

/// Lines of failing command output kept in an error.
const OUTPUT_TAIL_LINES: usize = 20;

/// Directory scanned for GitHub Actions workflows.
pub const WORKFLOW_DIR: &str = ".github/workflows";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutcome {
    pub path: PathBuf,

    /// The destination already existed and was used as-is.
    pub reused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    Created,

    /// The branch existed locally and was checked out.
    Reused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    NothingToCommit,
}

/// Pull request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSpec {
    pub title: String,
    pub body: String,
    pub base: String,
    pub head: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Clean,

    /// `terraform plan -detailed-exitcode` returned 2.
    Drift,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub workspaces: Vec<String>,
    pub plan: PlanStatus,
}

/// Where a repository's state lives in S3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLocation<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub region: &'a str,
    pub profile: &'a str,
}

/// Uniform wrapper over git, gh, aws, terraform and the state copy script.
#[derive(Clone)]
pub struct OperationAdapter {
    runner: Arc<dyn CommandRunner>,
    redactor: Arc<Redactor>,
    timeouts: OperationTimeouts,
    dry_run: bool,
}

impl OperationAdapter {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        redactor: Arc<Redactor>,
        timeouts: OperationTimeouts,
        dry_run: bool,
    ) -> Self {
        Self {
            runner,
            redactor,
            timeouts,
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// `gh repo clone <org>/<repo> <dest>`. An existing destination is reused.
    pub async fn clone_repository(
        &self,
        org: &str,
        repo: &str,
        dest: &Path,
    ) -> Result<CloneOutcome, OperationError> {
        if self.dry_run {
            simulate("clone", format!("clone {org}/{repo} into {}", dest.display()));
            return Ok(CloneOutcome {
                path: dest.to_path_buf(),
                reused: false,
            });
        }

        if dest.exists() {
            warn!(repo, path = %dest.display(), "working copy already exists, reusing it");
            return Ok(CloneOutcome {
                path: dest.to_path_buf(),
                reused: true,
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OperationError::io(format!("creating {}", parent.display()), &e))?;
        }

        let spec = CommandSpec::new("gh", self.timeouts.transfer()).args([
            "repo".to_string(),
            "clone".to_string(),
            format!("{org}/{repo}"),
            dest.display().to_string(),
        ]);
        self.exec_checked(spec).await?;
        Ok(CloneOutcome {
            path: dest.to_path_buf(),
            reused: false,
        })
    }

    /// `git checkout -b <branch>`, falling back to checking out an existing
    /// local branch of the same name.
    pub async fn create_branch(
        &self,
        path: &Path,
        branch: &str,
    ) -> Result<BranchOutcome, OperationError> {
        if self.dry_run {
            simulate("branch", format!("create branch {branch}"));
            return Ok(BranchOutcome::Created);
        }

        let create = self.git(path, self.timeouts.mutate(), ["checkout", "-b", branch]);
        match self.exec_checked(create).await {
            Ok(_) => Ok(BranchOutcome::Created),
            Err(OperationError::NonZeroExit { output, .. }) if output.contains("already exists") => {
                let checkout = self.git(path, self.timeouts.mutate(), ["checkout", branch]);
                self.exec_checked(checkout).await?;
                Ok(BranchOutcome::Reused)
            }
            Err(e) => Err(e),
        }
    }

    /// Stage everything and commit. Succeeds without committing when the
    /// working tree is clean.
    pub async fn commit_all(
        &self,
        path: &Path,
        message: &str,
    ) -> Result<CommitOutcome, OperationError> {
        if self.dry_run {
            simulate("commit", format!("commit with message {message:?}"));
            return Ok(CommitOutcome::Committed);
        }

        self.exec_checked(self.git(path, self.timeouts.mutate(), ["add", "."]))
            .await?;
        let status = self
            .exec_checked(self.git(path, self.timeouts.read(), ["status", "--porcelain"]))
            .await?;
        if status.stdout.trim().is_empty() {
            info!(path = %path.display(), "nothing to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        self.exec_checked(self.git(path, self.timeouts.mutate(), ["commit", "-m", message]))
            .await?;
        Ok(CommitOutcome::Committed)
    }

    /// `git push -u origin <branch>`.
    pub async fn push_branch(&self, path: &Path, branch: &str) -> Result<(), OperationError> {
        if self.dry_run {
            simulate("push", format!("push branch {branch} to origin"));
            return Ok(());
        }

        self.exec_checked(self.git(path, self.timeouts.mutate(), ["push", "-u", "origin", branch]))
            .await?;
        Ok(())
    }

    /// Whether an open pull request exists for `head`.
    pub async fn pull_request_exists(&self, path: &Path, head: &str) -> Result<bool, OperationError> {
        if self.dry_run {
            simulate("pr_check", format!("check for an open pull request from {head}"));
            return Ok(false);
        }

        let spec = CommandSpec::new("gh", self.timeouts.read())
            .args(["pr", "list", "--head", head, "--state", "open", "--json", "number"])
            .current_dir(path);
        let display = self.redactor.redact(&spec.display());
        let out = self.exec_checked(spec).await?;

        let text = out.stdout.trim();
        if text.is_empty() {
            return Ok(false);
        }
        let prs: Vec<serde_json::Value> =
            serde_json::from_str(text).map_err(|e| OperationError::MalformedOutput {
                command: display,
                reason: e.to_string(),
            })?;
        Ok(!prs.is_empty())
    }

    /// `gh pr create`. Returns the pull request URL when gh prints one.
    pub async fn create_pull_request(
        &self,
        path: &Path,
        pr: &PullRequestSpec,
    ) -> Result<Option<String>, OperationError> {
        if self.dry_run {
            simulate(
                "pr",
                format!("open pull request {:?} from {} into {}", pr.title, pr.head, pr.base),
            );
            return Ok(None);
        }

        let spec = CommandSpec::new("gh", self.timeouts.mutate())
            .args(["pr", "create", "--title", pr.title.as_str(), "--body", pr.body.as_str()])
            .args(["--base", pr.base.as_str(), "--head", pr.head.as_str()])
            .current_dir(path);
        let out = self.exec_checked(spec).await?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("http"))
            .last()
            .map(str::to_string))
    }

    /// Local and remote branch names.
    pub async fn list_branches(&self, path: &Path) -> Result<Vec<String>, OperationError> {
        if self.dry_run {
            simulate("list_branches", "list branches".to_string());
            return Ok(Vec::new());
        }

        let out = self
            .exec_checked(self.git(path, self.timeouts.read(), ["branch", "-a"]))
            .await?;
        Ok(out
            .stdout
            .lines()
            .map(|l| l.trim_start_matches('*').trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Inject `secret` into every workflow under `.github/workflows` that
    /// runs Terraform and lacks it. Returns the number of files changed, or
    /// that would change in dry-run.
    pub async fn update_workflow_secrets(
        &self,
        path: &Path,
        secret: &WorkflowSecret,
    ) -> Result<usize, OperationError> {
        let dir = path.join(WORKFLOW_DIR);
        if !dir.is_dir() {
            debug!(path = %dir.display(), "no workflow directory");
            return Ok(0);
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| OperationError::io(format!("listing {}", dir.display()), &e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OperationError::io(format!("listing {}", dir.display()), &e))?
        {
            let file = entry.path();
            let is_yaml = file
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yml" || e == "yaml");
            if is_yaml && file.is_file() {
                files.push(file);
            }
        }
        files.sort();

        let mut updated = 0;
        for file in files {
            let content = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| OperationError::io(format!("reading {}", file.display()), &e))?;
            let Some(new_content) = inject_workflow_secret(&content, secret) else {
                continue;
            };
            if self.dry_run {
                simulate("workflows", format!("add {} to {}", secret.env_name, file.display()));
            } else {
                tokio::fs::write(&file, new_content)
                    .await
                    .map_err(|e| OperationError::io(format!("writing {}", file.display()), &e))?;
                info!(file = %file.display(), "updated workflow");
            }
            updated += 1;
        }
        Ok(updated)
    }

    /// Run `copy_state.sh` from `scripts_dir` inside the working copy with
    /// `AWS_PROFILE` set.
    pub async fn copy_state_to_object_store(
        &self,
        path: &Path,
        scripts_dir: &Path,
        profile: &str,
    ) -> Result<(), OperationError> {
        let script = scripts_dir.join(STATE_COPY_SCRIPT);
        if self.dry_run {
            simulate(
                "copy_state",
                format!("run {} with AWS_PROFILE={profile}", script.display()),
            );
            return Ok(());
        }

        let script = tokio::fs::canonicalize(&script)
            .await
            .map_err(|_| OperationError::MissingFile { path: script.clone() })?;
        let spec = CommandSpec::new("bash", self.timeouts.transfer())
            .arg(script.display().to_string())
            .current_dir(path)
            .env("AWS_PROFILE", profile);
        let out = self.exec_checked(spec).await?;
        debug!(output = %out.stdout.trim(), "state copy finished");
        Ok(())
    }

    /// Whether the state object exists. Exit code 1 from `aws s3 ls` means
    /// "no such key"; any other failure is an error.
    pub async fn verify_state(&self, location: &StateLocation<'_>) -> Result<bool, OperationError> {
        let url = format!("s3://{}/{}", location.bucket, location.key);
        if self.dry_run {
            simulate("verify", format!("check that {url} exists"));
            return Ok(false);
        }

        let spec = CommandSpec::new("aws", self.timeouts.read()).args([
            "s3",
            "ls",
            url.as_str(),
            "--profile",
            location.profile,
            "--region",
            location.region,
        ]);
        let out = self.exec(spec).await?;
        match out.exit_code {
            Some(0) => Ok(!out.stdout.trim().is_empty()),
            Some(1) => Ok(false),
            code => Err(OperationError::NonZeroExit {
                command: self.redactor.redact(&format!("aws s3 ls {url}")),
                exit_code: code.unwrap_or(-1),
                output: failure_output(&out),
            }),
        }
    }

    /// `terraform workspace list`, current workspace marker stripped.
    pub async fn list_workspaces(&self, path: &Path) -> Result<Vec<String>, OperationError> {
        if self.dry_run {
            simulate("workspaces", "list terraform workspaces".to_string());
            return Ok(vec!["default".to_string()]);
        }

        let spec = CommandSpec::new("terraform", self.timeouts.mutate())
            .args(["workspace", "list"])
            .current_dir(path);
        let out = self.exec_checked(spec).await?;
        Ok(out
            .stdout
            .lines()
            .map(|l| l.trim_start_matches('*').trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Write `terraform state pull` output to
    /// `<backup_dir>/<repo>_state_<timestamp>.json`.
    ///
    /// The state is written unredacted and never logged.
    pub async fn backup_state_locally(
        &self,
        path: &Path,
        repo: &str,
        backup_dir: &Path,
    ) -> Result<Option<PathBuf>, OperationError> {
        if self.dry_run {
            simulate("backup", format!("pull state into {}", backup_dir.display()));
            return Ok(None);
        }

        let spec = CommandSpec::new("terraform", self.timeouts.transfer())
            .args(["state", "pull"])
            .current_dir(path);
        let out = self.exec_inner(spec, false).await?;
        if !out.succeeded {
            return Err(OperationError::NonZeroExit {
                command: "terraform state pull".to_string(),
                exit_code: out.exit_code.unwrap_or(-1),
                output: self.redactor.redact(out.stderr.trim()),
            });
        }

        tokio::fs::create_dir_all(backup_dir)
            .await
            .map_err(|e| OperationError::io(format!("creating {}", backup_dir.display()), &e))?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let file = backup_dir.join(format!("{repo}_state_{stamp}.json"));
        tokio::fs::write(&file, out.stdout.as_bytes())
            .await
            .map_err(|e| OperationError::io(format!("writing {}", file.display()), &e))?;
        info!(repo, file = %file.display(), "state backed up");
        Ok(Some(file))
    }

    /// Reinitialise against the new backend and run a detailed-exitcode
    /// plan. Exit 2 is drift; any other non-zero exit is an error.
    pub async fn validate_state_integrity(
        &self,
        path: &Path,
    ) -> Result<IntegrityReport, OperationError> {
        if self.dry_run {
            simulate("integrity", "terraform init -reconfigure && terraform plan".to_string());
            return Ok(IntegrityReport {
                workspaces: vec!["default".to_string()],
                plan: PlanStatus::Clean,
            });
        }

        let init = CommandSpec::new("terraform", self.timeouts.transfer())
            .args(["init", "-reconfigure", "-input=false"])
            .current_dir(path);
        self.exec_checked(init).await?;

        let workspaces = self.list_workspaces(path).await?;

        let plan = CommandSpec::new("terraform", self.timeouts.transfer())
            .args(["plan", "-detailed-exitcode", "-input=false", "-lock=false"])
            .current_dir(path);
        let display = self.redactor.redact(&plan.display());
        let out = self.exec(plan).await?;
        let plan = match out.exit_code {
            Some(0) => PlanStatus::Clean,
            Some(2) => PlanStatus::Drift,
            code => {
                return Err(OperationError::NonZeroExit {
                    command: display,
                    exit_code: code.unwrap_or(-1),
                    output: failure_output(&out),
                })
            }
        };
        Ok(IntegrityReport { workspaces, plan })
    }

    fn git<'a>(
        &self,
        path: &Path,
        timeout: std::time::Duration,
        args: impl IntoIterator<Item = &'a str>,
    ) -> CommandSpec {
        CommandSpec::new("git", timeout).args(args).current_dir(path)
    }

    /// Run and redact, treating a non-zero exit as a normal output.
    async fn exec(&self, spec: CommandSpec) -> Result<CommandOutput, OperationError> {
        self.exec_inner(spec, true).await
    }

    /// Run and redact, turning a non-zero exit into `NonZeroExit`.
    async fn exec_checked(&self, spec: CommandSpec) -> Result<CommandOutput, OperationError> {
        let command = self.redactor.redact(&spec.display());
        let out = self.exec(spec).await?;
        if out.succeeded {
            return Ok(out);
        }
        Err(OperationError::NonZeroExit {
            command,
            exit_code: out.exit_code.unwrap_or(-1),
            output: failure_output(&out),
        })
    }

    async fn exec_inner(
        &self,
        spec: CommandSpec,
        redact_stdout: bool,
    ) -> Result<CommandOutput, OperationError> {
        let command = self.redactor.redact(&spec.display());
        debug!(command = %command, timeout_secs = spec.timeout.as_secs(), "running command");

        let out = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| e.map_text(|s| self.redactor.redact(s)))?;

        debug!(
            command = %command,
            exit_code = ?out.exit_code,
            duration_ms = out.duration_ms,
            "command finished"
        );

        let CommandOutput {
            succeeded,
            exit_code,
            stdout,
            stderr,
            duration_ms,
        } = out;
        Ok(CommandOutput {
            succeeded,
            exit_code,
            stdout: if redact_stdout {
                self.redactor.redact(&stdout)
            } else {
                stdout
            },
            stderr: self.redactor.redact(&stderr),
            duration_ms,
        })
    }
}

fn simulate(action: &str, detail: String) {
    info!(action, dry_run = true, "[DRY RUN] would {detail}");
}

/// Last lines of stderr, or stdout when stderr is empty.
fn failure_output(out: &CommandOutput) -> String {
    let text = if out.stderr.trim().is_empty() {
        out.stdout.trim()
    } else {
        out.stderr.trim()
    };
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[start..].join("\n")
}
