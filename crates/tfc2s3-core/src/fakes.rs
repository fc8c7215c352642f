//! In-memory fakes for the runner and reporter seams (testing only)
//!
//! Provides `ScriptedRunner` and `RecordingReporter`, which satisfy the trait
//! contracts without spawning processes or installing a subscriber.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{MigrationResult, RunSummary, StepRecord};
use crate::obs::ProgressReporter;
use crate::ops::{CommandOutput, CommandRunner, CommandSpec, OperationError};

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// Canned answer for a matching command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
    NotFound,

    /// Panic inside the runner, simulating a bug below the pipeline.
    Panic(String),
}

impl ScriptedReply {
    pub fn ok(stdout: impl Into<String>) -> Self {
        ScriptedReply::Exit {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        ScriptedReply::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runner that answers from prefix rules over `CommandSpec::display()` and
/// records every call. The first matching rule wins; unmatched commands
/// succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, ScriptedReply)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for commands whose display starts with `prefix`.
    pub fn with_rule(self, prefix: &str, reply: ScriptedReply) -> Self {
        self.on(prefix, reply);
        self
    }

    pub fn on(&self, prefix: &str, reply: ScriptedReply) {
        lock(&self.rules).push((prefix.to_string(), reply));
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }

    /// Display strings of every call, in order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.calls).iter().map(CommandSpec::display).collect()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn reply_for(&self, display: &str) -> ScriptedReply {
        lock(&self.rules)
            .iter()
            .find(|(prefix, _)| display.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| ScriptedReply::ok(""))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, OperationError> {
        let display = spec.display();
        lock(&self.calls).push(spec.clone());

        match self.reply_for(&display) {
            ScriptedReply::Exit {
                code,
                stdout,
                stderr,
            } => Ok(CommandOutput::exit(code, stdout, stderr)),
            ScriptedReply::Timeout => Err(OperationError::Timeout {
                command: display,
                timeout_secs: spec.timeout.as_secs(),
            }),
            ScriptedReply::NotFound => Err(OperationError::NotFound {
                program: spec.program.clone(),
            }),
            ScriptedReply::Panic(message) => panic!("{message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// One reporter callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReporterEvent {
    RunStarted { repositories: usize },
    StepStarted { repo: String, step: StepRecord },
    StepCompleted { repo: String, step: StepRecord },
    StepSkipped { repo: String, step: StepRecord },
    StepFailed { repo: String, step: StepRecord },
    Warning { repo: String, message: String },
    PipelineFinished { repo: String, success: bool },
    RunFinished { total: usize, failed: usize },
}

/// Reporter that keeps every callback in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReporterEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReporterEvent> {
        lock(&self.events).clone()
    }

    /// Steps reported complete for `repo`, in order.
    pub fn completed_steps(&self, repo: &str) -> Vec<StepRecord> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                ReporterEvent::StepCompleted { repo: r, step } if r == repo => Some(*step),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ReporterEvent) {
        lock(&self.events).push(event);
    }
}

impl ProgressReporter for RecordingReporter {
    fn run_started(&self, _run_id: &str, repositories: usize, _batch_size: usize, _dry_run: bool) {
        self.push(ReporterEvent::RunStarted { repositories });
    }

    fn step_started(&self, repo: &str, step: StepRecord) {
        self.push(ReporterEvent::StepStarted {
            repo: repo.to_string(),
            step,
        });
    }

    fn step_completed(&self, repo: &str, step: StepRecord) {
        self.push(ReporterEvent::StepCompleted {
            repo: repo.to_string(),
            step,
        });
    }

    fn step_skipped(&self, repo: &str, step: StepRecord, _reason: &str) {
        self.push(ReporterEvent::StepSkipped {
            repo: repo.to_string(),
            step,
        });
    }

    fn step_failed(&self, repo: &str, step: StepRecord, _error: &str) {
        self.push(ReporterEvent::StepFailed {
            repo: repo.to_string(),
            step,
        });
    }

    fn warning(&self, repo: &str, message: &str) {
        self.push(ReporterEvent::Warning {
            repo: repo.to_string(),
            message: message.to_string(),
        });
    }

    fn pipeline_finished(&self, result: &MigrationResult) {
        self.push(ReporterEvent::PipelineFinished {
            repo: result.repository.clone(),
            success: result.success,
        });
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.push(ReporterEvent::RunFinished {
            total: summary.total,
            failed: summary.failed,
        });
    }
}

/// Lock ignoring poison; a panicking test pipeline must not break the fake.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
