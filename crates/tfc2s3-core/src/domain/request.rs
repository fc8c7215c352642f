//! Immutable per-run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{MigrationConfig, OperationTimeouts, COMMIT_MESSAGE, PR_BODY, PR_TITLE};
use crate::rewrite::{state_key, BackendTarget, SourceRewriteOptions, WorkflowSecret};
use crate::version::VersionRequirements;

/// Destination S3 backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreSettings {
    pub bucket: String,
    pub region: String,

    /// AWS CLI profile passed to the state copy script and checks.
    pub profile: String,

    pub lock_table: Option<String>,
}

/// Steps and checks the operator asked to skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipFlags {
    /// Skip the environment probe before any pipeline starts.
    pub environment: bool,

    /// Skip pipeline step 3 (module version validation).
    pub version_check: bool,
}

/// Everything a run needs, built once at start-up and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub org: String,
    pub store: ObjectStoreSettings,
    pub branch: String,
    pub base_branch: String,
    pub work_dir: PathBuf,
    pub scripts_path: Option<PathBuf>,

    /// Where to write `terraform state pull` backups. `None` disables them.
    pub backup_dir: Option<PathBuf>,

    pub batch_size: usize,
    pub dry_run: bool,
    pub auto_commit: bool,
    pub check_integrity: bool,
    pub skip: SkipFlags,

    /// Not acted on; no operation is retried.
    pub max_retries: u32,

    pub repositories: Vec<String>,
    pub version_requirements: VersionRequirements,
    pub source_options: SourceRewriteOptions,
    pub workflow_secret: WorkflowSecret,
    pub timeouts: OperationTimeouts,
    pub commit_message: String,
    pub pr_title: String,
    pub pr_body: String,
}

impl MigrationRequest {
    /// Request with every setting taken from `config`.
    pub fn from_config(config: &MigrationConfig, repositories: Vec<String>) -> Self {
        Self {
            org: config.org.clone(),
            store: ObjectStoreSettings {
                bucket: config.bucket.clone(),
                region: config.region.clone(),
                profile: config.aws_profile.clone(),
                lock_table: config.lock_table.clone(),
            },
            branch: config.branch.clone(),
            base_branch: config.base_branch.clone(),
            work_dir: config.work_dir.clone(),
            scripts_path: None,
            backup_dir: None,
            batch_size: config.batch_size,
            dry_run: false,
            auto_commit: false,
            check_integrity: false,
            skip: SkipFlags::default(),
            max_retries: config.max_retries,
            repositories,
            version_requirements: config.version_requirements.clone(),
            source_options: config.source_options(),
            workflow_secret: config.workflow_secret.clone(),
            timeouts: config.timeouts,
            commit_message: COMMIT_MESSAGE.to_string(),
            pr_title: PR_TITLE.to_string(),
            pr_body: PR_BODY.to_string(),
        }
    }

    /// Backend parameters for one repository.
    pub fn backend_target(&self, repo: &str) -> BackendTarget {
        BackendTarget::new(&self.store.bucket, &self.store.region, state_key(repo))
            .with_lock_table(self.store.lock_table.clone())
    }

    /// Whether step 8 needs an interactive confirmation.
    pub fn needs_commit_approval(&self) -> bool {
        !self.dry_run && !self.auto_commit
    }
}

/// A validated repository and its working copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryTarget {
    pub name: String,
    pub path: PathBuf,
}

impl RepositoryTarget {
    /// Target rooted at `<work_dir>/<name>`. The name must already be valid.
    pub fn new(name: impl Into<String>, work_dir: &Path) -> Self {
        let name = name.into();
        let path = work_dir.join(&name);
        Self { name, path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults() {
        let request = MigrationRequest::from_config(
            &MigrationConfig::default(),
            vec!["repo-a".to_string()],
        );
        assert_eq!(request.store.bucket, "your-org-tfstate-bucket");
        assert_eq!(request.batch_size, 1);
        assert!(request.needs_commit_approval());
        assert!(!request.dry_run);
    }

    #[test]
    fn test_backend_target_uses_repo_key() {
        let request = MigrationRequest::from_config(&MigrationConfig::default(), vec![]);
        let target = request.backend_target("repo-a");
        assert_eq!(target.key, "repo-a/terraform.tfstate");
        assert_eq!(target.lock_table.as_deref(), Some("terraform-state-lock"));
    }

    #[test]
    fn test_repository_target_path() {
        let target = RepositoryTarget::new("repo-a", Path::new("/tmp/work"));
        assert_eq!(target.path, PathBuf::from("/tmp/work/repo-a"));
    }
}
