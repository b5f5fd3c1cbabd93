//! Terminal control surface.
//!
//! Reads line commands from stdin and shows the advisory shutdown countdown.
//! Stands in for a tray menu; everything goes through [`ControlHandle`].

use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::control::ControlHandle;
use crate::domain::WarningNotice;
use crate::domain::WarningSession;
use crate::event_log::EventLog;
use crate::state::SharedState;

/// How often the countdown is reprinted.
const COUNTDOWN_STEP: Duration = Duration::from_secs(15);

const HELP: &str = "\
Commands:
  pause | resume | toggle   pause or resume idle monitoring
  threshold <seconds>       set the idle limit (minimum 5)
  cancel                    cancel a pending shutdown
  status                    show current state
  log                       show the event log
  quit                      stop the daemon (a pending shutdown still fires)
  help                      show this help";

/// Parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Toggle,
    Threshold(u64),
    Cancel,
    Status,
    Log,
    Quit,
    Help,
}

/// Console input errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0} (try 'help')")]
    Unknown(String),

    #[error("Usage: threshold <seconds>")]
    MissingValue,

    #[error("Not a number of seconds: {0}")]
    InvalidNumber(String),
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ParseError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Err(ParseError::Empty);
    };

    match word.to_ascii_lowercase().as_str() {
        "pause" => Ok(ConsoleCommand::Pause),
        "resume" => Ok(ConsoleCommand::Resume),
        "toggle" => Ok(ConsoleCommand::Toggle),
        "threshold" | "limit" => {
            let value = words.next().ok_or(ParseError::MissingValue)?;
            value
                .parse()
                .map(ConsoleCommand::Threshold)
                .map_err(|_| ParseError::InvalidNumber(value.to_string()))
        }
        "cancel" => Ok(ConsoleCommand::Cancel),
        "status" => Ok(ConsoleCommand::Status),
        "log" => Ok(ConsoleCommand::Log),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        "help" | "?" => Ok(ConsoleCommand::Help),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

/// Human-readable remaining time, e.g. "1 minute" or "45 seconds".
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    match secs {
        60 => "1 minute".to_string(),
        s if s > 60 && s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{s} seconds"),
    }
}

/// Nearest whole second, for display.
fn round_to_secs(remaining: Duration) -> Duration {
    Duration::from_secs((remaining + Duration::from_millis(500)).as_secs())
}

/// Console front-end.
pub struct Console {
    handle: ControlHandle,
    state: SharedState,
    log: EventLog,
    notices: broadcast::Receiver<WarningNotice>,
}

impl Console {
    pub fn new(
        handle: ControlHandle,
        state: SharedState,
        log: EventLog,
        notices: broadcast::Receiver<WarningNotice>,
    ) -> Self {
        Self {
            handle,
            state,
            log,
            notices,
        }
    }

    /// Serve stdin and warning notices until `shutdown` is canceled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut pending: Option<WarningSession> = None;
        let mut next_reminder = Instant::now();

        println!("Type 'help' for commands.");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,

                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Ok(command) => self.execute(command),
                        Err(ParseError::Empty) => {}
                        Err(e) => println!("{e}"),
                    },
                    Ok(None) => {
                        debug!("stdin closed, console input disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                },

                notice = self.notices.recv() => match notice {
                    Ok(WarningNotice::Started { session }) => {
                        println!(
                            "Computer idle. Shutdown in {}. Type 'cancel' to abort.",
                            format_remaining(session.delay)
                        );
                        next_reminder = Instant::now() + COUNTDOWN_STEP.min(session.remaining());
                        pending = Some(session);
                    }
                    Ok(WarningNotice::Canceled) => {
                        println!("Shutdown canceled.");
                        pending = None;
                    }
                    Err(RecvError::Lagged(n)) => warn!("Missed {} warning notices", n),
                    Err(RecvError::Closed) => return,
                },

                () = tokio::time::sleep_until(next_reminder), if pending.is_some() => {
                    let left = pending.as_ref().map_or(Duration::ZERO, WarningSession::remaining);
                    if left.is_zero() {
                        println!("Shutdown is due now.");
                        pending = None;
                    } else {
                        println!("Shutdown in {}.", format_remaining(round_to_secs(left)));
                        next_reminder = Instant::now() + COUNTDOWN_STEP.min(left);
                    }
                }
            }
        }
    }

    fn execute(&self, command: ConsoleCommand) {
        let result = match command {
            ConsoleCommand::Pause => self.handle.set_paused(true),
            ConsoleCommand::Resume => self.handle.set_paused(false),
            ConsoleCommand::Toggle => self.handle.toggle_pause(),
            ConsoleCommand::Threshold(seconds) => self.handle.request_set_threshold(seconds),
            ConsoleCommand::Cancel => {
                if !self.state.warning_active() {
                    println!("No shutdown pending.");
                }
                self.handle.request_cancel_warning()
            }
            ConsoleCommand::Status => {
                println!("{}", self.status_text());
                Ok(())
            }
            ConsoleCommand::Log => {
                for entry in self.log.entries() {
                    println!("{}", entry.line());
                }
                Ok(())
            }
            ConsoleCommand::Quit => self.handle.quit(),
            ConsoleCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("{e}");
        }
    }

    fn status_text(&self) -> String {
        let snapshot = self.state.snapshot();
        let mut text = format!(
            "Monitoring: {}\nIdle limit: {} seconds",
            if snapshot.paused { "paused" } else { "active" },
            snapshot.idle_threshold.as_secs()
        );
        if let Some(started) = snapshot.warning_started_at {
            text.push_str(&format!(
                "\nShutdown warning since {}",
                started.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlCommand;
    use crate::domain::Threshold;
    use crate::domain::WarningSession;
    use crate::state::MonitorState;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("pause"), Ok(ConsoleCommand::Pause));
        assert_eq!(parse_command("  Resume "), Ok(ConsoleCommand::Resume));
        assert_eq!(parse_command("toggle"), Ok(ConsoleCommand::Toggle));
        assert_eq!(parse_command("cancel"), Ok(ConsoleCommand::Cancel));
        assert_eq!(parse_command("status"), Ok(ConsoleCommand::Status));
        assert_eq!(parse_command("log"), Ok(ConsoleCommand::Log));
        assert_eq!(parse_command("exit"), Ok(ConsoleCommand::Quit));
        assert_eq!(parse_command("?"), Ok(ConsoleCommand::Help));
    }

    #[test]
    fn test_parse_threshold() {
        assert_eq!(
            parse_command("threshold 600"),
            Ok(ConsoleCommand::Threshold(600))
        );
        assert_eq!(parse_command("limit 5"), Ok(ConsoleCommand::Threshold(5)));
        assert_eq!(parse_command("threshold"), Err(ParseError::MissingValue));
        assert_eq!(
            parse_command("threshold -3"),
            Err(ParseError::InvalidNumber("-3".to_string()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_command("reboot"),
            Err(ParseError::Unknown("reboot".to_string()))
        );
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::from_secs(60)), "1 minute");
        assert_eq!(format_remaining(Duration::from_secs(120)), "2 minutes");
        assert_eq!(format_remaining(Duration::from_secs(45)), "45 seconds");
        assert_eq!(format_remaining(Duration::from_secs(90)), "90 seconds");
        assert_eq!(format_remaining(Duration::from_secs(1)), "1 second");
    }

    #[test]
    fn test_round_to_secs() {
        assert_eq!(round_to_secs(Duration::from_millis(44_600)), Duration::from_secs(45));
        assert_eq!(round_to_secs(Duration::from_millis(44_400)), Duration::from_secs(44));
        assert_eq!(round_to_secs(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_status_text() {
        let (handle, _rx) = ControlHandle::channel();
        let (_tx, notices) = broadcast::channel(1);
        let state = SharedState::new(MonitorState::new(Threshold::new(600).unwrap(), true));
        let console = Console::new(handle, state.clone(), EventLog::in_memory(), notices);

        assert_eq!(console.status_text(), "Monitoring: paused\nIdle limit: 600 seconds");

        state.lock().session = Some(WarningSession::begin(
            Threshold::new(600).unwrap(),
            Duration::from_secs(60),
        ));
        assert!(console.status_text().contains("Shutdown warning since"));
    }

    #[test]
    fn test_execute_forwards_to_handle() {
        let (handle, mut rx) = ControlHandle::channel();
        let (_tx, notices) = broadcast::channel(1);
        let state = SharedState::new(MonitorState::new(Threshold::new(600).unwrap(), false));
        let console = Console::new(handle, state, EventLog::in_memory(), notices);

        console.execute(ConsoleCommand::Pause);
        console.execute(ConsoleCommand::Threshold(3)); // rejected before queueing
        console.execute(ConsoleCommand::Threshold(30));
        console.execute(ConsoleCommand::Quit);

        assert_eq!(rx.try_recv().unwrap(), ControlCommand::SetPaused(true));
        assert_eq!(
            rx.try_recv().unwrap(),
            ControlCommand::SetThreshold(Threshold::new(30).unwrap())
        );
        assert_eq!(rx.try_recv().unwrap(), ControlCommand::Quit);
    }
}
