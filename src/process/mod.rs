//! Process control — the narrow interface between the admin surface and the
//! process manager.
//!
//! Handlers only ever talk to [`ProcessControl`]; the one place that shells
//! out lives in [`pm2`]. Swapping supervisors means one new impl of this
//! trait.

pub mod pm2;

pub use pm2::Pm2Control;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process '{0}' not found")]
    NotFound(String),

    #[error("log file not found: {0}")]
    LogNotFound(PathBuf),

    #[error("command failed: {0}")]
    Command(String),

    #[error("unparseable process table: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry of the supervisor's process table.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pm_id: i64,
    pub status: Option<String>,
    pub restart_time: Option<i64>,
    pub uptime_ms: Option<i64>,
    pub memory: Option<u64>,
    pub cpu: Option<f64>,
}

/// Stdout/stderr log file locations for one process.
#[derive(Debug, Clone)]
pub struct LogPaths {
    pub out: PathBuf,
    pub err: PathBuf,
}

/// Which log stream an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Out,
    Err,
}

/// One live log line from a followed process.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub name: String,
    pub stream: LogStream,
    pub line: String,
}

/// A live log subscription. Dropping the receiver tears down the underlying
/// followers, so cleanup happens on every exit path — normal close, error,
/// or client abort.
pub struct LogSubscription {
    pub rx: mpsc::Receiver<LogEvent>,
}

/// Supervisor operations used by the admin surface.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Current process table.
    async fn list(&self) -> Result<Vec<ProcessInfo>, ProcessError>;

    /// Ask the supervisor to restart `name`.
    async fn restart(&self, name: &str) -> Result<(), ProcessError>;

    /// Locate the stdout/stderr log files for `name`.
    async fn log_paths(&self, name: &str) -> Result<LogPaths, ProcessError>;

    /// Last `lines` lines of a log file.
    async fn tail(&self, path: &Path, lines: usize) -> Result<String, ProcessError>;

    /// Follow both log streams of `name` live.
    async fn subscribe(&self, name: &str) -> Result<LogSubscription, ProcessError>;
}
