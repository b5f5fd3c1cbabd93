//! OS shutdown commands.
//!
//! Starting and aborting a delayed shutdown are best-effort requests to the
//! OS scheduler: the command is spawned, its exit status is reported, and
//! nothing is retried. Once a start command has been accepted the OS owns the
//! timer, so the shutdown fires even if this process exits first.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::config::ShutdownConfig;

/// Errors from shutdown command invocation.
#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("Shutdown command is empty")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Executes and aborts a timed system shutdown.
#[async_trait]
pub trait ShutdownAction: Send + Sync {
    /// Schedule a shutdown `delay` from now.
    async fn start_delayed_shutdown(&self, delay: Duration) -> Result<(), ShutdownError>;

    /// Abort a scheduled shutdown.
    async fn abort_shutdown(&self) -> Result<(), ShutdownError>;
}

/// Shutdown action that runs configured external commands.
#[derive(Debug, Clone)]
pub struct CommandShutdown {
    start_command: Vec<String>,
    abort_command: Vec<String>,
    dry_run: bool,
}

impl CommandShutdown {
    /// Create from config.
    pub fn from_config(config: &ShutdownConfig, dry_run: bool) -> Self {
        Self {
            start_command: config.start_command.clone(),
            abort_command: config.abort_command.clone(),
            dry_run,
        }
    }

    /// Build argv for the start command, substituting `{seconds}` and `{minutes}`.
    fn build_start_args(&self, delay: Duration) -> Vec<String> {
        let seconds = delay.as_secs();
        let minutes = seconds.div_ceil(60);
        self.start_command
            .iter()
            .map(|arg| {
                arg.replace("{seconds}", &seconds.to_string())
                    .replace("{minutes}", &minutes.to_string())
            })
            .collect()
    }

    async fn run(&self, argv: &[String]) -> Result<(), ShutdownError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ShutdownError::EmptyCommand);
        };

        if self.dry_run {
            info!("[DRY RUN] Would execute: {}", argv.join(" "));
            return Ok(());
        }

        debug!("Executing: {}", argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ShutdownError::Spawn {
                program: program.clone(),
                source,
            })?
            .wait_with_output()
            .await
            .map_err(|source| ShutdownError::Spawn {
                program: program.clone(),
                source,
            })?;

        if output.status.success() {
            trace!("{} succeeded", program);
            Ok(())
        } else {
            Err(ShutdownError::Exit {
                program: program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ShutdownAction for CommandShutdown {
    async fn start_delayed_shutdown(&self, delay: Duration) -> Result<(), ShutdownError> {
        let argv = self.build_start_args(delay);
        self.run(&argv).await
    }

    async fn abort_shutdown(&self) -> Result<(), ShutdownError> {
        self.run(&self.abort_command).await
    }
}
