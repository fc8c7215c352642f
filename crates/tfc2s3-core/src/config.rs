//! Run defaults and the optional TOML configuration file.
//!
//! Every field has a default so an empty file (or no file) is valid. CLI
//! flags override whatever is loaded here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{MigrationError, Result};
use crate::rewrite::{SourceRewriteOptions, WorkflowSecret};
use crate::version::{Version, VersionRequirement};

pub const DEFAULT_ORG: &str = "your-org";
pub const DEFAULT_BUCKET: &str = "your-org-tfstate-bucket";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_AWS_PROFILE: &str = "default";
pub const DEFAULT_BRANCH: &str = "migrate-to-s3-backend";
pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const DEFAULT_LOCK_TABLE: &str = "terraform-state-lock";
pub const DEFAULT_WORK_DIR: &str = "migration_work";
pub const DEFAULT_LOG_DIR: &str = "migration_logs";
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Carried for a future retry policy. Nothing retries today.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_REGISTRY_HOST: &str = "app.terraform.io";
pub const DEFAULT_GIT_HOST: &str = "github.com";
pub const DEFAULT_REPO_PREFIX: &str = "terraform";

/// Script expected under the scripts directory.
pub const STATE_COPY_SCRIPT: &str = "copy_state.sh";

/// Environment variable that overrides scripts discovery.
pub const SCRIPTS_PATH_ENV: &str = "PLATFORM_SCRIPTS_PATH";

pub const COMMIT_MESSAGE: &str = "Migrate Terraform backend from Cloud to S3";
pub const PR_TITLE: &str = "Migrate Terraform backend from Cloud to S3";

pub const PR_BODY: &str = "## Summary
This PR migrates the Terraform backend from Terraform Cloud to S3.

## Changes
- Replaced the `cloud {}` block with a `backend \"s3\" {}` configuration
- Converted Terraform Cloud registry module sources to Git sources
- Added the read-access token secret to Terraform workflows where needed
- Copied the existing state to the S3 bucket

## Testing
- [ ] `terraform init -reconfigure` succeeds
- [ ] `terraform plan` shows no unexpected changes
- [ ] CI workflows pass

## Post-merge steps
1. Confirm the state file exists in S3
2. Archive or delete the Terraform Cloud workspace
";

/// Candidate scripts directories searched after the environment override.
pub fn scripts_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(env) = std::env::var(SCRIPTS_PATH_ENV) {
        if !env.trim().is_empty() {
            paths.push(PathBuf::from(env));
        }
    }
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        let home = PathBuf::from(home);
        paths.push(home.join("repos").join("platform-scripts"));
        paths.push(home.join("source").join("repos").join("platform-scripts"));
    }
    paths.push(PathBuf::from("/opt/platform-scripts"));
    paths.push(PathBuf::from("/usr/local/platform-scripts"));
    paths
}

/// Built-in module version floors.
pub fn default_version_requirements() -> BTreeMap<String, VersionRequirement> {
    let mut reqs = BTreeMap::new();
    reqs.insert(
        "your-github-project-factory".to_string(),
        VersionRequirement::at_least(Version::new(vec![15, 1, 0])),
    );
    reqs.insert(
        "your-aws-project-factory".to_string(),
        VersionRequirement::at_least(Version::new(vec![5, 5, 2])),
    );
    reqs
}

/// Timeout classes for external operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationTimeouts {
    /// Read-only checks (`--version`, existence checks, listings).
    pub read_secs: u64,

    /// Metadata mutations (branch, commit, push, PR).
    pub mutate_secs: u64,

    /// Bulk transfers (clone, state copy, plan).
    pub transfer_secs: u64,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            read_secs: 10,
            mutate_secs: 60,
            transfer_secs: 600,
        }
    }
}

impl OperationTimeouts {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn mutate(&self) -> Duration {
        Duration::from_secs(self.mutate_secs)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_secs(self.transfer_secs)
    }
}

/// Contents of a `--config` TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub org: String,
    pub bucket: String,
    pub region: String,
    pub aws_profile: String,
    pub lock_table: Option<String>,
    pub branch: String,
    pub base_branch: String,
    pub work_dir: PathBuf,
    pub log_dir: PathBuf,
    pub batch_size: usize,
    pub max_retries: u32,
    pub registry_host: String,
    pub git_host: String,
    pub repo_prefix: String,
    pub timeouts: OperationTimeouts,
    pub workflow_secret: WorkflowSecret,

    /// Module name → version bounds checked before migrating.
    pub version_requirements: BTreeMap<String, VersionRequirement>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            org: DEFAULT_ORG.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
            aws_profile: DEFAULT_AWS_PROFILE.to_string(),
            lock_table: Some(DEFAULT_LOCK_TABLE.to_string()),
            branch: DEFAULT_BRANCH.to_string(),
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            registry_host: DEFAULT_REGISTRY_HOST.to_string(),
            git_host: DEFAULT_GIT_HOST.to_string(),
            repo_prefix: DEFAULT_REPO_PREFIX.to_string(),
            timeouts: OperationTimeouts::default(),
            workflow_secret: WorkflowSecret::default(),
            version_requirements: default_version_requirements(),
        }
    }
}

impl MigrationConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MigrationError::Config(e.to_string()))
    }

    /// Load a TOML file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn source_options(&self) -> SourceRewriteOptions {
        SourceRewriteOptions {
            registry_host: self.registry_host.clone(),
            git_host: self.git_host.clone(),
            repo_prefix: self.repo_prefix.clone(),
        }
    }
}
