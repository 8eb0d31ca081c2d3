//! Logging setup
//!
//! `init` is called once at process start and installs `env_logger`, writing
//! to stderr and to a timestamped file in the logs directory. Components do
//! not reach for a global handle; each one is constructed with a `LogContext`
//! naming the target it logs under.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const LOG_FILE_PREFIX: &str = "activity-core_";
const LOG_FILE_EXT: &str = "log";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    pub level: String,
    /// Directory for log files; stderr only when None
    pub logs_dir: Option<PathBuf>,
    /// Number of log files kept after pruning (including the current one)
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            logs_dir: None,
            max_files: 5,
        }
    }
}

/// Named log target handed to each component at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogContext {
    target: &'static str,
}

impl LogContext {
    pub const fn new(target: &'static str) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }
}

/// Flushes the installed logger when dropped
pub struct LoggingGuard {
    log_file: Option<PathBuf>,
}

impl LoggingGuard {
    /// Path of the file this process is logging to, if any
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        log::logger().flush();
    }
}

/// Writes every record to stderr and, when present, to the session log file
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            // A failing log file must never take stderr logging down with it
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Install the process logger. Calling it a second time leaves the first
/// logger in place.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let (file, log_file) = match &config.logs_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create logs directory {:?}", dir))?;
            let name = format!(
                "{}{}.{}",
                LOG_FILE_PREFIX,
                chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"),
                LOG_FILE_EXT
            );
            let path = dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {:?}", path))?;
            (Some(file), Some(path))
        }
        None => (None, None),
    };

    let installed = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.level.as_str()),
    )
    .format_timestamp_millis()
    .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
    .try_init();

    if installed.is_err() {
        log::debug!("Logger already installed, keeping the existing one");
    }

    if let Some(dir) = &config.logs_dir {
        let removed = prune_old_logs(dir, config.max_files);
        if removed > 0 {
            log::info!("Pruned {} old log files from {:?}", removed, dir);
        }
    }

    Ok(LoggingGuard { log_file })
}

/// Delete all but the `keep` most recent log files. Best-effort: failures are
/// logged and skipped. Returns the number of files removed.
pub fn prune_old_logs(dir: &Path, keep: usize) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to read logs directory {:?}: {}", dir, e);
            return 0;
        }
    };

    let mut logs: Vec<(PathBuf, SystemTime)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_log_file(&entry.path()))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    if logs.len() <= keep {
        return 0;
    }

    // Newest first; ties broken by name so the order is stable
    logs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    let mut removed = 0;
    for (path, _) in logs.into_iter().skip(keep) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    removed
}

fn is_log_file(path: &Path) -> bool {
    let name_matches = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(LOG_FILE_PREFIX))
        .unwrap_or(false);
    let ext_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == LOG_FILE_EXT)
        .unwrap_or(false);
    name_matches && ext_matches
}
