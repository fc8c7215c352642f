//! Apply the configuration rewrites across a repository working copy.
//!
//! Files are visited in sorted order. A file that cannot be read or written
//! becomes a warning and the scan continues; only a missing repository root
//! is an error.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::domain::error::{MigrationError, Result};
use crate::rewrite::{
    rewrite_backend_block, rewrite_module_sources_with, BackendTarget, ConfigFile,
    SourceRewriteOptions,
};
use crate::version::{validate_module_versions_with, VersionRequirements};

/// Directories never descended into.
const SKIPPED_DIRS: [&str; 2] = [".terraform", ".git"];

const CONFIG_EXTENSION: &str = "tf";

/// Outcome of the backend pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendReport {
    /// Files whose `cloud` block was replaced, relative to the root.
    pub files_matched: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl BackendReport {
    pub fn changed(&self) -> bool {
        !self.files_matched.is_empty()
    }

    /// The first matching file; later matches are rewritten too.
    pub fn authoritative(&self) -> Option<&Path> {
        self.files_matched.first().map(PathBuf::as_path)
    }
}

/// Outcome of the module source pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleReport {
    /// Sources replaced across all files.
    pub replaced: usize,
    pub files_changed: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Outcome of the version validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionReport {
    pub violations: Vec<String>,
    pub files_checked: usize,
    pub warnings: Vec<String>,
}

/// Runs rewrite passes over every `.tf` file below a repository root.
#[derive(Debug, Clone, Copy)]
pub struct RepositoryMutator {
    dry_run: bool,
}

impl RepositoryMutator {
    /// In dry-run mode rewrites are computed and reported but never written.
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Configuration files under `root`, sorted, relative to `root`.
    pub fn config_files(&self, root: &Path) -> Result<(Vec<PathBuf>, Vec<String>)> {
        if !root.is_dir() {
            return Err(MigrationError::Transform {
                path: root.display().to_string(),
                reason: "repository working copy does not exist".to_string(),
            });
        }

        let mut files = Vec::new();
        let mut warnings = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warnings.push(format!("cannot scan {}: {e}", root.display()));
                    continue;
                }
            };
            let is_config = entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some(CONFIG_EXTENSION);
            if is_config {
                let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
                files.push(rel.to_path_buf());
            }
        }

        debug!(root = %root.display(), files = files.len(), "collected configuration files");
        Ok((files, warnings))
    }

    /// Read every configuration file. Unreadable files become warnings.
    pub fn load(&self, root: &Path) -> Result<(Vec<ConfigFile>, Vec<String>)> {
        let (paths, mut warnings) = self.config_files(root)?;
        let mut files = Vec::with_capacity(paths.len());
        for rel in paths {
            match std::fs::read_to_string(root.join(&rel)) {
                Ok(content) => files.push(ConfigFile::new(rel, content)),
                Err(e) => warnings.push(transform_warning(&rel, &e)),
            }
        }
        Ok((files, warnings))
    }

    /// Check module versions against `requirements`. Git sources are matched
    /// by stripping `repo_prefix` from repository names.
    pub fn validate_versions(
        &self,
        root: &Path,
        requirements: &VersionRequirements,
        repo_prefix: &str,
    ) -> Result<VersionReport> {
        let (files, warnings) = self.load(root)?;
        let violations = validate_module_versions_with(&files, requirements, repo_prefix);
        for violation in &violations {
            warn!(violation = %violation, "module version requirement not met");
        }
        Ok(VersionReport {
            violations,
            files_checked: files.len(),
            warnings,
        })
    }

    /// Replace `cloud` blocks with `target`'s S3 backend in every file.
    pub fn rewrite_backends(&self, root: &Path, target: &BackendTarget) -> Result<BackendReport> {
        let (files, warnings) = self.load(root)?;
        let mut report = BackendReport {
            warnings,
            ..BackendReport::default()
        };

        for file in files {
            let rewrite = rewrite_backend_block(&file.content, target);
            if !rewrite.changed {
                continue;
            }
            if let Err(warning) = self.persist(root, &file.path, &rewrite.content) {
                report.warnings.push(warning);
                continue;
            }
            info!(file = %file.path.display(), dry_run = self.dry_run, "backend block replaced");
            report.files_matched.push(file.path);
        }

        if report.files_matched.len() > 1 {
            debug!(
                authoritative = ?report.authoritative(),
                matches = report.files_matched.len(),
                "multiple files declared a cloud backend"
            );
        }
        Ok(report)
    }

    /// Convert registry module sources to git sources in every file.
    pub fn rewrite_modules(
        &self,
        root: &Path,
        org: &str,
        options: &SourceRewriteOptions,
    ) -> Result<ModuleReport> {
        let (files, warnings) = self.load(root)?;
        let mut report = ModuleReport {
            warnings,
            ..ModuleReport::default()
        };

        for file in files {
            let rewrite = rewrite_module_sources_with(&file.content, org, options);
            if !rewrite.changed() {
                continue;
            }
            if let Err(warning) = self.persist(root, &file.path, &rewrite.content) {
                report.warnings.push(warning);
                continue;
            }
            debug!(file = %file.path.display(), replaced = rewrite.replaced, "module sources updated");
            report.replaced += rewrite.replaced;
            report.files_changed.push(file.path);
        }

        info!(replaced = report.replaced, "module source pass finished");
        Ok(report)
    }

    fn persist(&self, root: &Path, rel: &Path, content: &str) -> std::result::Result<(), String> {
        if self.dry_run {
            return Ok(());
        }
        std::fs::write(root.join(rel), content).map_err(|e| transform_warning(rel, &e))
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn transform_warning(path: &Path, err: &std::io::Error) -> String {
    MigrationError::Transform {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::state_key;
    use crate::version::{Version, VersionRequirement};
    use std::fs;

    const CLOUD_MAIN: &str = "terraform {\n  cloud {\n    organization = \"acme\"\n  }\n}\n";
    const REGISTRY_MODULE: &str =
        "module \"net\" {\n  source  = \"app.terraform.io/acme/net/aws\"\n  version = \"1.0.0\"\n}\n";

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.tf"), CLOUD_MAIN).unwrap();
        fs::create_dir_all(dir.path().join("modules/app")).unwrap();
        fs::write(dir.path().join("modules/app/main.tf"), REGISTRY_MODULE).unwrap();
        fs::create_dir_all(dir.path().join(".terraform/modules")).unwrap();
        fs::write(dir.path().join(".terraform/modules/cached.tf"), REGISTRY_MODULE).unwrap();
        fs::write(dir.path().join("README.md"), "cloud {").unwrap();
        dir
    }

    fn target() -> BackendTarget {
        BackendTarget::new("bucket", "us-east-1", state_key("repo-a"))
    }

    #[test]
    fn test_config_files_skip_cache_dir() {
        let dir = repo();
        let (files, warnings) = RepositoryMutator::new(false).config_files(dir.path()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(
            files,
            vec![PathBuf::from("main.tf"), PathBuf::from("modules/app/main.tf")]
        );
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let err = RepositoryMutator::new(false)
            .config_files(Path::new("/nonexistent/tfc2s3/repo"))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Transform { .. }));
    }

    #[test]
    fn test_rewrite_backends_writes_files() {
        let dir = repo();
        let report = RepositoryMutator::new(false)
            .rewrite_backends(dir.path(), &target())
            .unwrap();
        assert!(report.changed());
        assert_eq!(report.authoritative(), Some(Path::new("main.tf")));
        let content = fs::read_to_string(dir.path().join("main.tf")).unwrap();
        assert!(content.contains("backend \"s3\""));
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let dir = repo();
        let mutator = RepositoryMutator::new(true);
        let backend = mutator.rewrite_backends(dir.path(), &target()).unwrap();
        let modules = mutator
            .rewrite_modules(dir.path(), "acme", &SourceRewriteOptions::default())
            .unwrap();
        assert!(backend.changed());
        assert_eq!(modules.replaced, 1);
        assert_eq!(fs::read_to_string(dir.path().join("main.tf")).unwrap(), CLOUD_MAIN);
        assert_eq!(
            fs::read_to_string(dir.path().join("modules/app/main.tf")).unwrap(),
            REGISTRY_MODULE
        );
    }

    #[test]
    fn test_rewrite_modules_counts_across_files() {
        let dir = repo();
        fs::write(dir.path().join("extra.tf"), REGISTRY_MODULE.replace("net", "dns")).unwrap();
        let report = RepositoryMutator::new(false)
            .rewrite_modules(dir.path(), "acme", &SourceRewriteOptions::default())
            .unwrap();
        assert_eq!(report.replaced, 2);
        assert_eq!(report.files_changed.len(), 2);
        let cached = fs::read_to_string(dir.path().join(".terraform/modules/cached.tf")).unwrap();
        assert_eq!(cached, REGISTRY_MODULE);
    }

    #[test]
    fn test_validate_versions_reports_violation() {
        let dir = repo();
        let mut reqs = VersionRequirements::new();
        reqs.insert(
            "net".to_string(),
            VersionRequirement::at_least(Version::new(vec![2, 0, 0])),
        );
        let report = RepositoryMutator::new(false)
            .validate_versions(dir.path(), &reqs, "terraform")
            .unwrap();
        assert_eq!(report.files_checked, 2);
        assert_eq!(report.violations.len(), 1);
    }

    #[test]
    fn test_unreadable_file_is_a_warning() {
        let dir = repo();
        fs::write(dir.path().join("broken.tf"), [0xff, 0xfe, b'\n']).unwrap();

        let report = RepositoryMutator::new(false)
            .rewrite_backends(dir.path(), &target())
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("broken.tf"));
        assert_eq!(report.files_matched, vec![PathBuf::from("main.tf")]);
        let content = fs::read_to_string(dir.path().join("main.tf")).unwrap();
        assert!(content.contains("backend \"s3\""));
    }
}
