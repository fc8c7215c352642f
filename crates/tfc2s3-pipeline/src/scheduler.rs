//! Bounded-concurrency scheduling of repository pipelines.
//!
//! With a batch size of one, pipelines run sequentially and results keep the
//! input order. With a larger batch size up to that many pipelines run at
//! once and results arrive in completion order. A pipeline that panics or
//! whose task dies becomes a failed result for that repository only.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use tfc2s3_core::obs::run_span;
use tfc2s3_core::{
    MigrationReport, MigrationResult, ProgressReporter, Redactor, RepositoryTarget, RunSummary,
};

use crate::executor::{panic_message, PipelineExecutor};

/// One repository's migration, as seen by the scheduler.
#[async_trait]
pub trait RepositoryPipeline: Send + Sync {
    async fn run(&self, target: RepositoryTarget) -> MigrationResult;
}

#[async_trait]
impl RepositoryPipeline for PipelineExecutor {
    async fn run(&self, target: RepositoryTarget) -> MigrationResult {
        self.execute(target).await
    }
}

/// Runs a pipeline per target and aggregates the results.
pub struct MigrationScheduler {
    pipeline: Arc<dyn RepositoryPipeline>,
    reporter: Arc<dyn ProgressReporter>,
    redactor: Option<Arc<Redactor>>,
    dry_run: bool,
}

impl MigrationScheduler {
    pub fn new(
        pipeline: Arc<dyn RepositoryPipeline>,
        reporter: Arc<dyn ProgressReporter>,
        dry_run: bool,
    ) -> Self {
        Self {
            pipeline,
            reporter,
            redactor: None,
            dry_run,
        }
    }

    /// Scrub crash messages with `redactor` before they are logged or stored.
    pub fn with_redactor(mut self, redactor: Arc<Redactor>) -> Self {
        self.redactor = Some(redactor);
        self
    }

    /// Run every target with at most `batch_size` pipelines in flight.
    ///
    /// A batch size of zero is treated as one.
    pub async fn run(&self, targets: Vec<RepositoryTarget>, batch_size: usize) -> MigrationReport {
        let run_id = Uuid::new_v4();
        let span = run_span(&run_id.to_string());
        self.run_inner(run_id, targets, batch_size.max(1))
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        targets: Vec<RepositoryTarget>,
        batch_size: usize,
    ) -> MigrationReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.reporter
            .run_started(&run_id.to_string(), targets.len(), batch_size, self.dry_run);

        let results = if batch_size == 1 {
            info!("processing repositories sequentially");
            self.run_sequential(targets).await
        } else {
            info!(batch_size, "processing repositories in parallel");
            self.run_concurrent(targets, batch_size).await
        };

        let summary = RunSummary::from_results(&results, clock.elapsed());
        self.reporter.run_finished(&summary);

        MigrationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            results,
            summary,
        }
    }

    async fn run_sequential(&self, targets: Vec<RepositoryTarget>) -> Vec<MigrationResult> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            let name = target.name.clone();
            let outcome = AssertUnwindSafe(self.pipeline.run(target))
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(result) => result,
                Err(payload) => self.crashed(&name, &panic_message(payload.as_ref())),
            };
            results.push(result);
        }
        results
    }

    async fn run_concurrent(
        &self,
        targets: Vec<RepositoryTarget>,
        batch_size: usize,
    ) -> Vec<MigrationResult> {
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let mut pending = FuturesUnordered::new();

        for target in targets {
            let name = target.name.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let task = tokio::spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    pipeline.run(target).await
                }
                .in_current_span(),
            );
            pending.push(async move { (name, task.await) });
        }

        let mut results = Vec::with_capacity(pending.len());
        while let Some((name, joined)) = pending.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic().as_ref());
                    self.crashed(&name, &message)
                }
                Err(e) => self.crashed(&name, &e.to_string()),
            };
            results.push(result);
        }
        results
    }

    fn crashed(&self, repo: &str, message: &str) -> MigrationResult {
        let message = match &self.redactor {
            Some(redactor) => redactor.redact(message),
            None => message.to_string(),
        };
        warn!(repo, error = %message, "pipeline crashed");
        let result =
            MigrationResult::failed(repo, format!("Unexpected error during migration: {message}"));
        self.reporter.pipeline_finished(&result);
        result
    }
}
