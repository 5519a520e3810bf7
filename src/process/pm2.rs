//! PM2 implementation of [`ProcessControl`].
//!
//! Talks to the pm2 CLI: `pm2 jlist` for the process table, `pm2 restart`
//! for restarts. Log tailing reads the files pm2 reports in its process
//! table; live following spawns `tail -F` children that are killed when the
//! subscription is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    LogEvent, LogPaths, LogStream, LogSubscription, ProcessControl, ProcessError, ProcessInfo,
};

const SUBSCRIPTION_BUFFER: usize = 256;

// ── jlist shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct JlistEntry {
    name: String,
    pm_id: i64,
    #[serde(default)]
    pm2_env: JlistEnv,
    #[serde(default)]
    monit: JlistMonit,
}

#[derive(Deserialize, Default)]
struct JlistEnv {
    status: Option<String>,
    restart_time: Option<i64>,
    pm_uptime: Option<i64>,
    pm_out_log_path: Option<String>,
    pm_err_log_path: Option<String>,
}

#[derive(Deserialize, Default)]
struct JlistMonit {
    memory: Option<u64>,
    cpu: Option<f64>,
}

// ── Pm2Control ────────────────────────────────────────────────────────────────

pub struct Pm2Control {
    /// pm2 binary name/path, overridable for sandboxed deployments.
    binary: String,
}

impl Pm2Control {
    pub fn new() -> Self {
        Self {
            binary: "pm2".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn jlist(&self) -> Result<Vec<JlistEntry>, ProcessError> {
        let output = Command::new(&self.binary)
            .arg("jlist")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProcessError::Command(format!("{} jlist: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ProcessError::Command(format!(
                "{} jlist exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_jlist(&output.stdout)
    }

    async fn entry(&self, name: &str) -> Result<JlistEntry, ProcessError> {
        self.jlist()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ProcessError::NotFound(name.to_string()))
    }
}

impl Default for Pm2Control {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_jlist(stdout: &[u8]) -> Result<Vec<JlistEntry>, ProcessError> {
    // pm2 occasionally prints update banners before the JSON array.
    let text = String::from_utf8_lossy(stdout);
    let json_start = text
        .find('[')
        .ok_or_else(|| ProcessError::Parse("no JSON array in jlist output".into()))?;
    serde_json::from_str(&text[json_start..]).map_err(|e| ProcessError::Parse(e.to_string()))
}

fn to_info(entry: &JlistEntry, now_ms: i64) -> ProcessInfo {
    ProcessInfo {
        name: entry.name.clone(),
        pm_id: entry.pm_id,
        status: entry.pm2_env.status.clone(),
        restart_time: entry.pm2_env.restart_time,
        uptime_ms: entry.pm2_env.pm_uptime.map(|up| (now_ms - up).max(0)),
        memory: entry.monit.memory,
        cpu: entry.monit.cpu,
    }
}

#[async_trait]
impl ProcessControl for Pm2Control {
    async fn list(&self) -> Result<Vec<ProcessInfo>, ProcessError> {
        let now_ms = Utc::now().timestamp_millis();
        Ok(self
            .jlist()
            .await?
            .iter()
            .map(|entry| to_info(entry, now_ms))
            .collect())
    }

    async fn restart(&self, name: &str) -> Result<(), ProcessError> {
        let output = Command::new(&self.binary)
            .args(["restart", name])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProcessError::Command(format!("{} restart: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ProcessError::Command(format!(
                "{} restart {name} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(%name, "restart requested");
        Ok(())
    }

    async fn log_paths(&self, name: &str) -> Result<LogPaths, ProcessError> {
        let entry = self.entry(name).await?;
        let out = entry
            .pm2_env
            .pm_out_log_path
            .ok_or_else(|| ProcessError::Parse(format!("no out log path for '{name}'")))?;
        let err = entry
            .pm2_env
            .pm_err_log_path
            .ok_or_else(|| ProcessError::Parse(format!("no err log path for '{name}'")))?;
        Ok(LogPaths {
            out: PathBuf::from(out),
            err: PathBuf::from(err),
        })
    }

    async fn tail(&self, path: &Path, lines: usize) -> Result<String, ProcessError> {
        tail_file(path, lines).await
    }

    async fn subscribe(&self, name: &str) -> Result<LogSubscription, ProcessError> {
        let paths = self.log_paths(name).await?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        follow_file(name, LogStream::Out, &paths.out, tx.clone())?;
        follow_file(name, LogStream::Err, &paths.err, tx)?;

        Ok(LogSubscription { rx })
    }
}

/// Read the last `lines` lines of a file.
async fn tail_file(path: &Path, lines: usize) -> Result<String, ProcessError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProcessError::LogNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].join("\n"))
}

/// Spawn a `tail -F` child following `path` and forward its lines as
/// [`LogEvent`]s. The child dies with the subscription: the pump task exits
/// when the receiver is dropped and `kill_on_drop` reaps the process.
fn follow_file(
    name: &str,
    stream: LogStream,
    path: &Path,
    tx: mpsc::Sender<LogEvent>,
) -> Result<(), ProcessError> {
    let mut child = Command::new("tail")
        .arg("-n")
        .arg("0")
        .arg("-F")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProcessError::Command(format!("tail -F {}: {e}", path.display())))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProcessError::Command("tail child has no stdout".into()))?;

    let name = name.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                // Receiver dropped → subscription over → kill the child.
                _ = tx.closed() => break,

                next = lines.next_line() => {
                    match next {
                        Ok(Some(line)) => {
                            let event = LogEvent {
                                name: name.clone(),
                                stream,
                                line,
                            };
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("log follower read error: {e}");
                            break;
                        }
                    }
                }
            }
        }
        drop(child);
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;

    const SAMPLE_JLIST: &str = r#"[
      {
        "name": "bot-whatsapp",
        "pm_id": 0,
        "pm2_env": {
          "status": "online",
          "restart_time": 3,
          "pm_uptime": 1700000000000,
          "pm_out_log_path": "/home/deploy/.pm2/logs/bot-whatsapp-out.log",
          "pm_err_log_path": "/home/deploy/.pm2/logs/bot-whatsapp-error.log"
        },
        "monit": { "memory": 52428800, "cpu": 1.5 }
      }
    ]"#;

    #[test]
    fn parses_jlist_output() {
        let entries = parse_jlist(SAMPLE_JLIST.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "bot-whatsapp");
        assert_eq!(entries[0].pm2_env.status.as_deref(), Some("online"));
    }

    #[test]
    fn parses_jlist_with_leading_banner() {
        let noisy = format!("pm2 update available\n{SAMPLE_JLIST}");
        let entries = parse_jlist(noisy.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn jlist_without_array_is_a_parse_error() {
        assert!(matches!(
            parse_jlist(b"nothing here"),
            Err(ProcessError::Parse(_))
        ));
    }

    #[test]
    fn info_mapping_computes_uptime() {
        let entries = parse_jlist(SAMPLE_JLIST.as_bytes()).unwrap();
        let info = to_info(&entries[0], 1700000005000);
        assert_eq!(info.uptime_ms, Some(5000));
        assert_eq!(info.memory, Some(52428800));
        assert_eq!(info.pm_id, 0);
    }

    #[tokio::test]
    async fn tail_returns_last_lines() {
        let mut f = NamedTempFile::new().unwrap();
        for i in 1..=10 {
            writeln!(f, "line {i}").unwrap();
        }
        let text = tail_file(f.path(), 3).await.unwrap();
        assert_eq!(text, "line 8\nline 9\nline 10");
    }

    #[tokio::test]
    async fn tail_of_short_file_returns_everything() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "only line").unwrap();
        let text = tail_file(f.path(), 200).await.unwrap();
        assert_eq!(text, "only line");
    }

    #[tokio::test]
    async fn tail_of_missing_file_is_not_found() {
        let err = tail_file(Path::new("/nonexistent/astro.log"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::LogNotFound(_)));
    }
}
