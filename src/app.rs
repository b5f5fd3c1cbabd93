//! Daemon wiring.
//!
//! Runs the idle monitor loop on its own task and applies control commands
//! until a quit arrives. Quitting does not abort a shutdown that has already
//! been handed to the OS.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::config::Config;
use crate::control::ControlCommand;
use crate::control::ControlHandle;
use crate::domain::CancelOutcome;
use crate::domain::WarningNotice;
use crate::event_log::EventLog;
use crate::idle::IdleSource;
use crate::monitor::IdleMonitor;
use crate::shutdown::ShutdownAction;
use crate::state::MonitorState;
use crate::state::SharedState;
use crate::warning::WarningController;

/// The assembled daemon.
pub struct App {
    state: SharedState,
    log: EventLog,
    monitor: Arc<IdleMonitor>,
    controller: Arc<WarningController>,
    poll_interval: Duration,
    handle: ControlHandle,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    shutdown: CancellationToken,
}

impl App {
    /// Assemble the daemon from config and collaborators.
    pub fn new(
        config: &Config,
        source: Arc<dyn IdleSource>,
        action: Arc<dyn ShutdownAction>,
        log: EventLog,
    ) -> Result<Self> {
        config.validate()?;

        let state = SharedState::new(MonitorState::new(config.threshold()?, config.start_paused));
        let controller = Arc::new(WarningController::new(
            state.clone(),
            action,
            log.clone(),
            config.shutdown.delay(),
            config.rearm,
        ));
        let monitor = Arc::new(IdleMonitor::new(
            state.clone(),
            source,
            controller.clone(),
            log.clone(),
        ));
        let (handle, commands) = ControlHandle::channel();

        Ok(Self {
            state,
            log,
            monitor,
            controller,
            poll_interval: config.poll_interval(),
            handle,
            commands,
            shutdown: CancellationToken::new(),
        })
    }

    /// Handle for control surfaces.
    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Shared monitor state (read access for status displays).
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// The event log.
    pub fn event_log(&self) -> EventLog {
        self.log.clone()
    }

    /// Warning notices for a countdown prompt.
    pub fn subscribe_warnings(&self) -> broadcast::Receiver<WarningNotice> {
        self.controller.subscribe()
    }

    /// Token canceled when the daemon stops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until quit.
    pub async fn run(mut self) -> Result<()> {
        self.log.log_event("Application started.");

        let monitor_task = tokio::spawn(
            self.monitor
                .clone()
                .run(self.poll_interval, self.shutdown.child_token()),
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All control handles dropped");
                        break;
                    };
                    if self.apply(command).await.is_break() {
                        break;
                    }
                }
            }
        }

        self.shutdown.cancel();
        if let Err(e) = monitor_task.await {
            warn!("Idle monitor task failed: {}", e);
        }
        Ok(())
    }

    async fn apply(&self, command: ControlCommand) -> ControlFlow<()> {
        debug!("Control command: {:?}", command);
        match command {
            ControlCommand::TogglePause => {
                self.monitor.toggle_pause();
            }
            ControlCommand::SetPaused(paused) => {
                self.monitor.set_paused(paused);
            }
            ControlCommand::SetThreshold(threshold) => self.monitor.set_threshold(threshold),
            ControlCommand::CancelWarning => {
                if self.controller.cancel().await == CancelOutcome::NoActiveWarning {
                    debug!("Nothing to cancel");
                }
            }
            ControlCommand::Quit => {
                self.log.log_event("Application terminated by user.");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingShutdown;
    use crate::mock::ScriptedIdleSource;

    fn app(config: &Config, readings: &[f64]) -> (App, Arc<RecordingShutdown>) {
        let source = Arc::new(ScriptedIdleSource::new(readings.iter().copied()));
        let action = Arc::new(RecordingShutdown::new());
        let app = App::new(config, source, action.clone(), EventLog::in_memory()).unwrap();
        (app, action)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = Config {
            idle_threshold_seconds: 1,
            ..Default::default()
        };
        let source = Arc::new(ScriptedIdleSource::new(Vec::new()));
        let action = Arc::new(RecordingShutdown::new());
        assert!(App::new(&config, source, action, EventLog::in_memory()).is_err());
    }

    #[test]
    fn test_start_paused() {
        let config = Config {
            start_paused: true,
            ..Default::default()
        };
        let (app, _) = app(&config, &[]);
        assert!(app.state().is_paused());
    }

    #[tokio::test]
    async fn test_quit_logs_and_returns() {
        let (app, action) = app(&Config::default(), &[0.0]);
        let log = app.event_log();
        let token = app.shutdown_token();
        app.handle().quit().unwrap();

        app.run().await.unwrap();

        assert!(token.is_cancelled());
        assert_eq!(
            log.messages(),
            vec!["Application started.", "Application terminated by user."]
        );
        assert!(action.calls().is_empty());
    }

    #[tokio::test]
    async fn test_commands_applied_in_order() {
        let (app, _) = app(&Config::default(), &[0.0]);
        let handle = app.handle();
        let state = app.state();
        let log = app.event_log();

        handle.toggle_pause().unwrap();
        handle.request_set_threshold(120).unwrap();
        handle.set_paused(false).unwrap();
        handle.request_cancel_warning().unwrap();
        handle.quit().unwrap();
        app.run().await.unwrap();

        assert!(!state.is_paused());
        assert_eq!(state.threshold().as_secs(), 120);
        assert_eq!(
            log.messages(),
            vec![
                "Application started.",
                "Paused",
                "Idle threshold set to 120 seconds.",
                "Resumed",
                "Application terminated by user."
            ]
        );
    }
}
