//! Configuration loading and defaults for idle-shutdownd.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::MIN_THRESHOLD_SECONDS;
use crate::domain::RearmPolicy;
use crate::domain::Threshold;
use crate::idle::IdleBackend;

/// Main configuration for idle-shutdownd.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Idle seconds before the shutdown warning (default: 3600, minimum 5).
    pub idle_threshold_seconds: u64,

    /// Seconds between idle checks (default: 5).
    pub poll_interval_seconds: u64,

    /// Idle-duration backend (default: auto).
    pub idle_backend: IdleBackend,

    /// Re-arm behavior after a canceled warning (default: immediate).
    pub rearm: RearmPolicy,

    /// Start with monitoring paused.
    pub start_paused: bool,

    /// Dry run mode: log shutdown commands instead of executing.
    pub dry_run: bool,

    /// Shutdown command settings.
    pub shutdown: ShutdownConfig,

    /// Event log settings.
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_threshold_seconds: 3600,
            poll_interval_seconds: 5,
            idle_backend: IdleBackend::default(),
            rearm: RearmPolicy::default(),
            start_paused: false,
            dry_run: false,
            shutdown: ShutdownConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Delayed shutdown commands.
///
/// `{seconds}` and `{minutes}` (rounded up) in `start_command` are replaced
/// by the delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Delay between the warning and the shutdown (default: 60).
    pub delay_seconds: u64,

    /// Command that schedules the shutdown.
    pub start_command: Vec<String>,

    /// Command that aborts a scheduled shutdown.
    pub abort_command: Vec<String>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        let (start, abort): (&[&str], &[&str]) = if cfg!(windows) {
            (
                &[r"C:\Windows\System32\shutdown.exe", "/s", "/t", "{seconds}"],
                &[r"C:\Windows\System32\shutdown.exe", "/a"],
            )
        } else {
            (&["shutdown", "-h", "+{minutes}"], &["shutdown", "-c"])
        };

        Self {
            delay_seconds: 60,
            start_command: start.iter().map(ToString::to_string).collect(),
            abort_command: abort.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ShutdownConfig {
    /// Delay as a `Duration`.
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

/// Event log files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Write daily log files (default: true).
    pub file_enabled: bool,

    /// Directory for daily files.
    /// If unset, uses the platform data dir (`~/.local/share/idle-shutdownd/logs`).
    pub directory: Option<PathBuf>,

    /// Days to keep daily files (default: 60).
    pub retention_days: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_enabled: true,
            directory: None,
            retention_days: 60,
        }
    }
}

impl LogConfig {
    /// Resolve the log directory, if file logging is on and a location exists.
    pub fn resolved_directory(&self) -> Option<PathBuf> {
        if !self.file_enabled {
            return None;
        }
        self.directory.clone().or_else(|| {
            dirs::data_local_dir().map(|d| d.join("idle-shutdownd").join("logs"))
        })
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("idle-shutdownd").join("config.toml");
            if default_path.exists() {
                return Self::load(&default_path);
            }
        }

        Ok(Self::default())
    }

    /// Check values the types cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.idle_threshold_seconds < MIN_THRESHOLD_SECONDS {
            anyhow::bail!(
                "idle_threshold_seconds must be at least {} (got {})",
                MIN_THRESHOLD_SECONDS,
                self.idle_threshold_seconds
            );
        }
        if self.poll_interval_seconds == 0 {
            anyhow::bail!("poll_interval_seconds must be greater than 0");
        }
        if self.shutdown.delay_seconds == 0 {
            anyhow::bail!("shutdown.delay_seconds must be greater than 0");
        }
        if self.shutdown.start_command.is_empty() {
            anyhow::bail!("shutdown.start_command must not be empty");
        }
        if self.shutdown.abort_command.is_empty() {
            anyhow::bail!("shutdown.abort_command must not be empty");
        }
        Ok(())
    }

    /// Validated idle threshold.
    pub fn threshold(&self) -> Result<Threshold> {
        Threshold::new(self.idle_threshold_seconds).context("Invalid idle_threshold_seconds")
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}
