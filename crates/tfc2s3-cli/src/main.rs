//! tfc2s3 - Terraform Cloud to S3 state backend migration CLI
//!
//! Moves each listed repository off Terraform Cloud: copies its state into
//! S3, rewrites the backend and module sources, updates CI workflows and
//! opens a pull request with the changes.
//!
//! ```text
//! tfc2s3 --repos repo-a,repo-b --org acme --bucket acme-tfstate --dry-run
//! ```

mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn, Level};

use tfc2s3_core::config::scripts_search_paths;
use tfc2s3_core::validation::validate_batch_size;
use tfc2s3_core::{
    find_scripts_path, init_tracing, parse_repository_list, probe_environment, render_summary,
    validate_targets, write_report_json, CommandRunner, MigrationConfig, MigrationRequest,
    OperationAdapter, ProcessRunner, ProgressReporter, Redactor, TelemetryOptions,
    TracingReporter,
};
use tfc2s3_pipeline::{AutoApprove, CommitApproval, MigrationScheduler, PipelineExecutor};

use crate::prompt::TerminalApproval;

#[derive(Parser, Debug)]
#[command(name = "tfc2s3")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Migrate Terraform state from Terraform Cloud to an S3 backend", long_about = None)]
struct Cli {
    /// Comma-separated repository names
    #[arg(long)]
    repos: String,

    /// GitHub organization that owns the repositories
    #[arg(long, env = "TFC2S3_ORG")]
    org: Option<String>,

    /// S3 bucket receiving the state
    #[arg(long, env = "TFC2S3_BUCKET")]
    bucket: Option<String>,

    /// AWS region of the bucket
    #[arg(long, env = "TFC2S3_REGION")]
    region: Option<String>,

    /// AWS CLI profile
    #[arg(long, env = "TFC2S3_AWS_PROFILE")]
    aws_profile: Option<String>,

    /// Directory containing copy_state.sh (auto-detected if omitted)
    #[arg(long)]
    scripts_path: Option<PathBuf>,

    /// Number of repositories migrated at once
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    batch_size: Option<u16>,

    /// Show what would change without touching anything
    #[arg(long)]
    dry_run: bool,

    /// Skip the tool and credential checks (not recommended)
    #[arg(long)]
    skip_validation: bool,

    /// Skip module version validation
    #[arg(long)]
    skip_version_check: bool,

    /// Commit and push without asking
    #[arg(long)]
    auto_commit: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Where repositories are cloned
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Name of the migration branch
    #[arg(long)]
    branch: Option<String>,

    /// Directory for the per-run log file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// TOML file with defaults, version requirements and timeouts
    #[arg(long, env = "TFC2S3_CONFIG")]
    config: Option<PathBuf>,

    /// Save `terraform state pull` output here before copying state
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Run `terraform plan` against the new backend after migrating
    #[arg(long)]
    check_integrity: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    /// Flags win over the config file.
    fn apply_overrides(&self, config: &mut MigrationConfig) {
        if let Some(org) = &self.org {
            config.org = org.clone();
        }
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if let Some(profile) = &self.aws_profile {
            config.aws_profile = profile.clone();
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = work_dir.clone();
        }
        if let Some(branch) = &self.branch {
            config.branch = branch.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = usize::from(batch_size);
        }
    }

    fn build_request(&self, config: &MigrationConfig) -> MigrationRequest {
        let mut request =
            MigrationRequest::from_config(config, parse_repository_list(&self.repos));
        request.dry_run = self.dry_run;
        request.auto_commit = self.auto_commit;
        request.skip.environment = self.skip_validation;
        request.skip.version_check = self.skip_version_check;
        request.backup_dir = self.backup_dir.clone();
        request.check_integrity = self.check_integrity;
        request
    }

    fn telemetry(&self, config: &MigrationConfig) -> TelemetryOptions {
        TelemetryOptions {
            json: self.json,
            level: if self.verbose { Level::DEBUG } else { Level::INFO },
            log_dir: Some(config.log_dir.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MigrationConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MigrationConfig::default(),
    };
    cli.apply_overrides(&mut config);

    let telemetry = init_tracing(&cli.telemetry(&config)).context("Failed to initialise logging")?;
    if let Some(path) = telemetry.log_path() {
        info!(log_file = %path.display(), "logging to file");
    }

    let outcome = run(&cli, &config).await;
    if let Err(e) = &outcome {
        error!(error = %format!("{e:#}"), "migration aborted");
    }
    telemetry.flush();
    outcome
}

async fn run(cli: &Cli, config: &MigrationConfig) -> Result<ExitCode> {
    validate_batch_size(config.batch_size).context("Invalid batch size")?;
    let mut request = cli.build_request(config);

    info!(
        org = %request.org,
        bucket = %request.store.bucket,
        region = %request.store.region,
        profile = %request.store.profile,
        branch = %request.branch,
        batch_size = request.batch_size,
        max_retries = request.max_retries,
        dry_run = request.dry_run,
        "starting Terraform Cloud to S3 migration"
    );
    if request.dry_run {
        warn!("DRY RUN: no changes will be made");
    }

    let (targets, rejected) = validate_targets(&request.repositories, &request.work_dir);
    for (name, reason) in &rejected {
        warn!(repo = %name, error = %reason, "skipping invalid repository name");
    }
    if !rejected.is_empty() {
        warn!(count = rejected.len(), "filtered out invalid repository names");
    }
    if targets.is_empty() {
        error!("no valid repositories to migrate");
        return Ok(ExitCode::FAILURE);
    }

    let redactor = Arc::new(Redactor::with_defaults().context("Failed to build redaction rules")?);
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);

    if request.skip.environment {
        warn!("skipping environment validation");
    } else {
        info!("validating environment");
        let report = probe_environment(
            runner.as_ref(),
            &redactor,
            request.timeouts.read(),
            &request.store.profile,
        )
        .await
        .context("Environment validation failed (use --skip-validation to bypass)")?;
        for warning in &report.warnings {
            warn!("{warning}");
        }
    }

    let scripts = find_scripts_path(cli.scripts_path.as_deref(), &scripts_search_paths())
        .context("Platform scripts not found (use --scripts-path to specify location)")?;
    info!(path = %scripts.display(), "using platform scripts");
    request.scripts_path = Some(scripts);

    tokio::fs::create_dir_all(&request.work_dir)
        .await
        .with_context(|| format!("Failed to create working directory {}", request.work_dir.display()))?;

    let terminal = Arc::new(TerminalApproval::new());
    if request.needs_commit_approval() {
        info!(repositories = targets.len(), "ready to migrate");
        if !terminal
            .confirm("Proceed with migration?".to_string(), false)
            .await
        {
            info!("migration cancelled by user");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let request = Arc::new(request);
    let reporter: Arc<dyn ProgressReporter> = Arc::new(TracingReporter);
    let approval: Arc<dyn CommitApproval> = if request.needs_commit_approval() {
        terminal as Arc<dyn CommitApproval>
    } else {
        Arc::new(AutoApprove)
    };
    let adapter = OperationAdapter::new(runner, Arc::clone(&redactor), request.timeouts, request.dry_run);
    let executor = PipelineExecutor::new(Arc::clone(&request), adapter, approval, Arc::clone(&reporter));
    let scheduler = MigrationScheduler::new(Arc::new(executor), reporter, request.dry_run)
        .with_redactor(redactor);

    let report = scheduler.run(targets, request.batch_size).await;
    println!("{}", render_summary(&report));

    if let Some(path) = &cli.report {
        write_report_json(path, &report)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "run report written");
    }

    Ok(ExitCode::from(report.summary.exit_code() as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["tfc2s3"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repos_is_required() {
        assert!(Cli::try_parse_from(["tfc2s3", "--dry-run"]).is_err());
    }

    #[test]
    fn test_batch_size_must_be_positive() {
        assert!(Cli::try_parse_from(["tfc2s3", "--repos", "a", "--batch-size", "0"]).is_err());
        assert_eq!(parse(&["--repos", "a", "--batch-size", "4"]).batch_size, Some(4));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "--repos",
            "repo-a, repo-b",
            "--org",
            "acme",
            "--bucket",
            "acme-tfstate",
            "--branch",
            "move-state",
            "--batch-size",
            "3",
            "--dry-run",
            "--skip-version-check",
        ]);
        let mut config = MigrationConfig::default();
        cli.apply_overrides(&mut config);
        let request = cli.build_request(&config);

        assert_eq!(request.org, "acme");
        assert_eq!(request.store.bucket, "acme-tfstate");
        assert_eq!(request.store.region, "us-east-1");
        assert_eq!(request.branch, "move-state");
        assert_eq!(request.batch_size, 3);
        assert_eq!(request.repositories, vec!["repo-a", "repo-b"]);
        assert!(request.dry_run);
        assert!(request.skip.version_check);
        assert!(!request.skip.environment);
        assert!(!request.needs_commit_approval());
    }

    #[test]
    fn test_defaults_come_from_config() {
        let cli = parse(&["--repos", "repo-a"]);
        let config = MigrationConfig::from_toml_str("org = \"from-file\"\nbatch_size = 2\n").unwrap();
        let mut merged = config.clone();
        cli.apply_overrides(&mut merged);

        let request = cli.build_request(&merged);
        assert_eq!(request.org, "from-file");
        assert_eq!(request.batch_size, 2);
        assert!(request.needs_commit_approval());
        assert_eq!(cli.telemetry(&merged).level, Level::INFO);
    }

    #[test]
    fn test_verbose_enables_debug() {
        let cli = parse(&["--repos", "repo-a", "-v", "--json", "--log-dir", "/tmp/tfc2s3-logs"]);
        let mut config = MigrationConfig::default();
        cli.apply_overrides(&mut config);
        let options = cli.telemetry(&config);
        assert_eq!(options.level, Level::DEBUG);
        assert!(options.json);
        assert_eq!(options.log_dir, Some(PathBuf::from("/tmp/tfc2s3-logs")));
    }
}
