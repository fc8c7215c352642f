//! Process execution seam.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use super::error::OperationError;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `program arg1 arg2` for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub succeeded: bool,

    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,

    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    pub fn exit(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            succeeded: code == 0,
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms: 0,
        }
    }
}

/// Runs external commands.
///
/// A non-zero exit is not an error at this level; it is reported through
/// [`CommandOutput::succeeded`]. Errors are reserved for commands that could
/// not run to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, OperationError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, OperationError> {
        let start = Instant::now();

        if let Some(dir) = &spec.cwd {
            if !dir.is_dir() {
                return Err(OperationError::MissingWorkingDirectory { path: dir.clone() });
            }
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OperationError::NotFound {
                program: spec.program.clone(),
            },
            _ => OperationError::Spawn {
                command: spec.display(),
                reason: e.to_string(),
            },
        })?;

        // Dropping the wait future on timeout kills the child.
        let output = tokio::time::timeout(spec.timeout, child.wait_with_output())
            .await
            .map_err(|_| OperationError::Timeout {
                command: spec.display(),
                timeout_secs: spec.timeout.as_secs(),
            })?
            .map_err(|e| OperationError::io(format!("waiting for `{}`", spec.display()), &e))?;

        Ok(CommandOutput {
            succeeded: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
