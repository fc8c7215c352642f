//! Centralised tracing initialisation for the migration binary.
//!
//! Call [`init_tracing`] once at program start. Console output honours
//! `RUST_LOG` and the `--json` switch; when a log directory is given every
//! event is also appended to a per-run file named
//! `migration_<YYYYmmdd_HHMMSS>.log`.
//!
//! Safe to call more than once; only the first call installs a subscriber.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::domain::error::{MigrationError, Result};

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Newline-delimited JSON on the console.
    pub json: bool,
    /// Default verbosity when `RUST_LOG` is unset.
    pub level: Level,
    /// Directory for the per-run log file, created if missing.
    pub log_dir: Option<PathBuf>,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            json: false,
            level: Level::INFO,
            log_dir: None,
        }
    }
}

/// Shared handle to the run log file.
///
/// Each event is formatted into a private buffer and written under the lock
/// in one piece, so lines from concurrent pipelines never interleave.
#[derive(Clone)]
struct LogFile(Arc<Mutex<BufWriter<File>>>);

impl LogFile {
    fn flush(&self) {
        if let Ok(mut file) = self.0.lock() {
            let _ = file.flush();
        }
    }
}

struct LogFileWriter {
    file: LogFile,
    buf: Vec<u8>,
}

impl Write for LogFileWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogFileWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let mut file = match self.file.0.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = file.write_all(&self.buf);
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter {
            file: self.clone(),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Keeps the run log file alive and flushes it on drop.
#[derive(Default)]
pub struct TelemetryGuard {
    log_path: Option<PathBuf>,
    file: Option<LogFile>,
}

impl TelemetryGuard {
    /// Path of the per-run log file, if one was opened.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn flush(&self) {
        if let Some(file) = &self.file {
            file.flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Name of the log file for a run started now.
pub fn log_file_name() -> String {
    format!("migration_{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

fn open_log_file(dir: &Path) -> Result<(PathBuf, LogFile)> {
    std::fs::create_dir_all(dir).map_err(|e| {
        MigrationError::Config(format!("cannot create log directory {}: {e}", dir.display()))
    })?;
    let path = dir.join(log_file_name());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| MigrationError::Config(format!("cannot open log file {}: {e}", path.display())))?;
    Ok((path, LogFile(Arc::new(Mutex::new(BufWriter::new(file))))))
}

/// Initialise the global tracing subscriber.
///
/// Respects `RUST_LOG`; falls back to `options.level`. Fails only when the
/// log directory or file cannot be created.
pub fn init_tracing(options: &TelemetryOptions) -> Result<TelemetryGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.level.as_str()));

    let mut guard = TelemetryGuard::default();
    let file_layer = match &options.log_dir {
        Some(dir) => {
            let (path, file) = open_log_file(dir)?;
            guard.log_path = Some(path);
            guard.file = Some(file.clone());
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(file),
            )
        }
        None => None,
    };

    let console = if options.json {
        fmt::layer().with_target(false).json().boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console)
        .try_init()
        .ok();

    Ok(guard)
}
