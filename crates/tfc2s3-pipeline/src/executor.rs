//! The twelve-step migration pipeline for a single repository.
//!
//! Steps run strictly in order. A fatal step that fails records an error and
//! ends the pipeline; validation problems, verification misses and the
//! optional backup and integrity checks only add warnings. A panic anywhere
//! below is caught at the pipeline boundary and recorded as an error, so it
//! never reaches the scheduler.

use std::any::Any;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, Instrument};

use tfc2s3_core::obs::pipeline_span;
use tfc2s3_core::ops::{CommitOutcome, PlanStatus, PullRequestSpec, StateLocation};
use tfc2s3_core::{
    state_key, MigrationError, MigrationRequest, MigrationResult, OperationAdapter,
    ProgressReporter, RepositoryMutator, RepositoryTarget, ResultAccumulator, StepRecord,
};

use crate::approval::CommitApproval;
use crate::step::{label, planned_steps, StepPolicy};

/// Runs the pipeline for one repository at a time; share it across tasks
/// behind an `Arc`.
pub struct PipelineExecutor {
    request: Arc<MigrationRequest>,
    adapter: OperationAdapter,
    mutator: RepositoryMutator,
    approval: Arc<dyn CommitApproval>,
    reporter: Arc<dyn ProgressReporter>,
}

impl PipelineExecutor {
    pub fn new(
        request: Arc<MigrationRequest>,
        adapter: OperationAdapter,
        approval: Arc<dyn CommitApproval>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let mutator = RepositoryMutator::new(request.dry_run);
        Self {
            request,
            adapter,
            mutator,
            approval,
            reporter,
        }
    }

    pub fn request(&self) -> &MigrationRequest {
        &self.request
    }

    /// Run every step for `target` and return its result.
    ///
    /// Never panics: a panic inside a step becomes an error on the result,
    /// keeping the steps recorded before it.
    pub async fn execute(&self, target: RepositoryTarget) -> MigrationResult {
        let mut acc = ResultAccumulator::new(target.name.as_str());
        info!(
            org = %self.request.org,
            repo = %target.name,
            path = %target.path.display(),
            steps = planned_steps(&self.request.skip).len(),
            "starting migration"
        );

        let outcome = AssertUnwindSafe(self.run_steps(&target, &mut acc))
            .catch_unwind()
            .instrument(pipeline_span(&target.name))
            .await;
        if let Err(payload) = outcome {
            let message = self.adapter.redactor().redact(&format!(
                "Unexpected error during migration: {}",
                panic_message(payload.as_ref())
            ));
            self.reporter.warning(&target.name, &message);
            acc.error(message);
        }

        let result = acc.finish();
        self.reporter.pipeline_finished(&result);
        result
    }

    async fn run_steps(&self, target: &RepositoryTarget, acc: &mut ResultAccumulator) {
        let req = &*self.request;
        let repo = target.name.as_str();

        // 1. clone
        self.start(repo, StepRecord::Clone);
        let path = match self
            .adapter
            .clone_repository(&req.org, repo, &target.path)
            .await
        {
            Ok(clone) => {
                if clone.reused {
                    self.warn(
                        acc,
                        format!("Reused existing working copy at {}", clone.path.display()),
                    );
                }
                clone.path
            }
            Err(e) => return self.fail(acc, StepRecord::Clone, "Failed to clone repository", e),
        };
        self.complete(acc, StepRecord::Clone);

        // 2. branch
        self.start(repo, StepRecord::Branch);
        match self.adapter.create_branch(&path, &req.branch).await {
            Ok(outcome) => debug!(repo, branch = %req.branch, ?outcome, "branch ready"),
            Err(e) => return self.fail(acc, StepRecord::Branch, "Failed to create branch", e),
        }
        self.complete(acc, StepRecord::Branch);

        let checkout_missing = self.adapter.is_dry_run() && !path.is_dir();

        // 3. validate
        if req.skip.version_check {
            self.reporter
                .step_skipped(repo, StepRecord::Validate, "module version check disabled");
        } else {
            self.start(repo, StepRecord::Validate);
            if checkout_missing {
                self.warn(acc, dry_run_skip(StepRecord::Validate, &path));
            } else {
                match self.mutator.validate_versions(
                    &path,
                    &req.version_requirements,
                    &req.source_options.repo_prefix,
                ) {
                    Ok(report) => {
                        if !report.violations.is_empty() {
                            info!(
                                repo,
                                violations = report.violations.len(),
                                "module version validation found problems"
                            );
                        }
                        for message in report.violations.into_iter().chain(report.warnings) {
                            self.warn(acc, message);
                        }
                    }
                    Err(e) => self.warn(acc, format!("Module version validation failed: {e}")),
                }
            }
            self.complete(acc, StepRecord::Validate);
        }

        // 4. copy state
        self.start(repo, StepRecord::CopyState);
        if let Some(backup_dir) = &req.backup_dir {
            match self
                .adapter
                .backup_state_locally(&path, repo, backup_dir)
                .await
            {
                Ok(Some(file)) => info!(repo, file = %file.display(), "local state backup written"),
                Ok(None) => {}
                Err(e) => self.warn(acc, format!("Local state backup failed: {e}")),
            }
        }
        let Some(scripts_path) = req.scripts_path.as_deref() else {
            return self.fail(
                acc,
                StepRecord::CopyState,
                "Failed to copy state to S3",
                "no scripts path configured",
            );
        };
        if let Err(e) = self
            .adapter
            .copy_state_to_object_store(&path, scripts_path, &req.store.profile)
            .await
        {
            return self.fail(acc, StepRecord::CopyState, "Failed to copy state to S3", e);
        }
        self.complete(acc, StepRecord::CopyState);

        // 5. backend
        self.start(repo, StepRecord::Backend);
        if checkout_missing {
            self.warn(acc, dry_run_skip(StepRecord::Backend, &path));
        } else {
            match self
                .mutator
                .rewrite_backends(&path, &req.backend_target(repo))
            {
                Ok(report) => {
                    let changed = report.changed();
                    if let Some(file) = report.authoritative() {
                        info!(repo, file = %file.display(), "backend configuration updated");
                    }
                    for warning in report.warnings {
                        self.warn(acc, warning);
                    }
                    if !changed {
                        if !self.adapter.is_dry_run() {
                            return self.fail(
                                acc,
                                StepRecord::Backend,
                                "Failed to update backend config",
                                "no Terraform Cloud backend block found",
                            );
                        }
                        self.warn(acc, "No Terraform Cloud backend block found");
                    }
                }
                Err(e) => {
                    return self.fail(acc, StepRecord::Backend, "Failed to update backend config", e)
                }
            }
        }
        self.complete(acc, StepRecord::Backend);

        // 6. modules
        self.start(repo, StepRecord::Modules);
        if checkout_missing {
            self.warn(acc, dry_run_skip(StepRecord::Modules, &path));
        } else {
            match self
                .mutator
                .rewrite_modules(&path, &req.org, &req.source_options)
            {
                Ok(report) => {
                    info!(repo, replaced = report.replaced, "module sources updated");
                    for warning in report.warnings {
                        self.warn(acc, warning);
                    }
                }
                Err(e) => {
                    return self.fail(acc, StepRecord::Modules, "Failed to update module sources", e)
                }
            }
        }
        self.complete(acc, StepRecord::Modules);

        // 7. workflows
        self.start(repo, StepRecord::Workflows);
        match self
            .adapter
            .update_workflow_secrets(&path, &req.workflow_secret)
            .await
        {
            Ok(updated) => info!(repo, updated, "workflow files updated"),
            Err(e) => {
                return self.fail(acc, StepRecord::Workflows, "Failed to update workflows", e)
            }
        }
        self.complete(acc, StepRecord::Workflows);

        // 8. commit
        self.start(repo, StepRecord::Commit);
        if req.needs_commit_approval() && !self.approval.approve(repo).await {
            self.reporter
                .step_skipped(repo, StepRecord::Commit, "commit declined");
            self.warn(acc, MigrationError::UserDeclined("commit".to_string()).to_string());
            info!(repo, "skipping commit and remaining steps");
            return;
        }
        match self.adapter.commit_all(&path, &req.commit_message).await {
            Ok(CommitOutcome::Committed) => {}
            Ok(CommitOutcome::NothingToCommit) => self.warn(acc, "No changes to commit"),
            Err(e) => return self.fail(acc, StepRecord::Commit, "Failed to commit changes", e),
        }
        self.complete(acc, StepRecord::Commit);

        // 9. push
        self.start(repo, StepRecord::Push);
        if let Err(e) = self.adapter.push_branch(&path, &req.branch).await {
            return self.fail(acc, StepRecord::Push, "Failed to push branch", e);
        }
        self.complete(acc, StepRecord::Push);

        // 10. pull request
        self.start(repo, StepRecord::Pr);
        let exists = match self.adapter.pull_request_exists(&path, &req.branch).await {
            Ok(exists) => exists,
            Err(e) => {
                self.warn(acc, format!("Could not check for an existing pull request: {e}"));
                false
            }
        };
        if exists {
            info!(repo, "pull request already exists, skipping creation");
            self.warn(acc, "PR already exists");
        } else {
            let pr = PullRequestSpec {
                title: req.pr_title.clone(),
                body: req.pr_body.clone(),
                base: req.base_branch.clone(),
                head: req.branch.clone(),
            };
            match self.adapter.create_pull_request(&path, &pr).await {
                Ok(Some(url)) => info!(repo, url = %url, "pull request created"),
                Ok(None) => {}
                Err(e) => {
                    return self.fail(acc, StepRecord::Pr, "Failed to create pull request", e)
                }
            }
        }
        self.complete(acc, StepRecord::Pr);

        // 11. verify
        self.start(repo, StepRecord::Verify);
        let key = state_key(repo);
        let location = StateLocation {
            bucket: &req.store.bucket,
            key: &key,
            region: &req.store.region,
            profile: &req.store.profile,
        };
        match self.adapter.verify_state(&location).await {
            Ok(true) => info!(repo, bucket = %req.store.bucket, key = %key, "state verified"),
            Ok(false) if self.adapter.is_dry_run() => {}
            Ok(false) => self.warn(acc, "Could not verify state in S3"),
            Err(e) => self.warn(acc, format!("Could not verify state in S3: {e}")),
        }
        if req.check_integrity {
            match self.adapter.validate_state_integrity(&path).await {
                Ok(report) if report.plan == PlanStatus::Drift => self.warn(
                    acc,
                    format!(
                        "Plan reports changes after migration (workspaces: {})",
                        report.workspaces.join(", ")
                    ),
                ),
                Ok(report) => info!(repo, workspaces = ?report.workspaces, "state integrity verified"),
                Err(e) => self.warn(acc, format!("State integrity check failed: {e}")),
            }
        }
        self.complete(acc, StepRecord::Verify);

        // 12. complete
        self.start(repo, StepRecord::Complete);
        self.complete(acc, StepRecord::Complete);
        info!(
            repo,
            branch = %req.branch,
            pulls = %format!("https://github.com/{}/{}/pulls", req.org, repo),
            "successfully migrated"
        );
    }

    fn start(&self, repo: &str, step: StepRecord) {
        debug!(repo, policy = ?StepPolicy::of(step), "{}", label(step));
        self.reporter.step_started(repo, step);
    }

    fn complete(&self, acc: &mut ResultAccumulator, step: StepRecord) {
        acc.complete(step);
        self.reporter.step_completed(acc.repository(), step);
    }

    fn warn(&self, acc: &mut ResultAccumulator, message: impl Into<String>) {
        let message = self.adapter.redactor().redact(&message.into());
        self.reporter.warning(acc.repository(), &message);
        acc.warn(message);
    }

    fn fail(
        &self,
        acc: &mut ResultAccumulator,
        step: StepRecord,
        context: &str,
        err: impl Display,
    ) {
        let message = self.adapter.redactor().redact(&format!("{context}: {err}"));
        self.reporter.step_failed(acc.repository(), step, &message);
        acc.error(message);
    }
}

fn dry_run_skip(step: StepRecord, path: &Path) -> String {
    format!(
        "{step} skipped in dry run: working copy {} not present",
        path.display()
    )
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
