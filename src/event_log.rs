//! User-facing event log.
//!
//! Every state transition is appended here as a timestamped line, kept in
//! memory for the log viewer and appended to a daily file
//! (`log_YYYY-MM-DD.txt`). Old daily files are removed at startup.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::Local;
use chrono::NaiveDate;
use tracing::debug;
use tracing::info;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_PREFIX: &str = "log_";
const FILE_SUFFIX: &str = ".txt";

/// One logged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub message: String,
}

impl LogEntry {
    /// Format as a log line.
    pub fn line(&self) -> String {
        format!("[{}] {}", self.timestamp, self.message)
    }
}

/// Append-only event log, cheap to clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    directory: Option<PathBuf>,
}

impl EventLog {
    /// Log that also writes daily files under `directory`.
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            directory: Some(directory.into()),
        }
    }

    /// Log kept only in memory.
    pub fn in_memory() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            directory: None,
        }
    }

    /// Record an event.
    ///
    /// File errors are reported as warnings and otherwise ignored.
    pub fn log_event(&self, message: impl Into<String>) {
        let now = Local::now();
        let entry = LogEntry {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            message: message.into(),
        };
        let line = entry.line();
        info!("{}", entry.message);

        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);

        if let Some(ref dir) = self.directory
            && let Err(e) = append_line(dir, &daily_file_name(now.date_naive()), &line)
        {
            warn!("Failed to write event log in {}: {}", dir.display(), e);
        }
    }

    /// Snapshot of all entries so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Messages only, in order.
    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }
}

/// File name for a given day.
pub fn daily_file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format("%Y-%m-%d"))
}

/// Parse the date out of a daily file name.
pub fn parse_daily_file_name(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn append_line(dir: &Path, file_name: &str, line: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(file_name))?;
    writeln!(file, "{line}")
}

/// Delete daily files older than `retention_days` relative to `today`.
///
/// Returns the number of files removed. Files whose names do not parse are
/// left alone; a missing directory is not an error.
pub fn cleanup_old_logs(dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!("No log directory at {}", dir.display());
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(date) = parse_daily_file_name(&name.to_string_lossy()) else {
            continue;
        };

        if (today - date).num_days() > i64::from(retention_days) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Removed old log file {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }
    }

    removed
}
