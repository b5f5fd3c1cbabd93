//! Control surface plumbing.
//!
//! UI front-ends (tray, console, signals) hold a [`ControlHandle`] and send
//! commands over a channel; the app drains the channel with a blocking
//! receive and applies them to the monitor and warning controller. Input
//! validation happens here, so invalid thresholds never reach the core.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::Threshold;
use crate::domain::ThresholdError;

/// Commands accepted by the running daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    TogglePause,
    SetPaused(bool),
    SetThreshold(Threshold),
    CancelWarning,
    Quit,
}

/// Errors returned to control surfaces.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControlError {
    #[error(transparent)]
    InvalidThreshold(#[from] ThresholdError),

    #[error("Daemon is no longer running")]
    Stopped,
}

/// Cloneable sender side used by UI callbacks.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlCommand>,
}

impl ControlHandle {
    /// Create a handle and the receiver the app drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControlCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, command: ControlCommand) -> Result<(), ControlError> {
        self.tx.send(command).map_err(|_| ControlError::Stopped)
    }

    /// Flip pause/resume.
    pub fn toggle_pause(&self) -> Result<(), ControlError> {
        self.send(ControlCommand::TogglePause)
    }

    /// Set the paused flag explicitly.
    pub fn set_paused(&self, paused: bool) -> Result<(), ControlError> {
        self.send(ControlCommand::SetPaused(paused))
    }

    /// Validate and submit a new idle threshold.
    pub fn request_set_threshold(&self, seconds: u64) -> Result<(), ControlError> {
        let threshold = Threshold::new(seconds)?;
        self.send(ControlCommand::SetThreshold(threshold))
    }

    /// Cancel the live warning, if any.
    pub fn request_cancel_warning(&self) -> Result<(), ControlError> {
        self.send(ControlCommand::CancelWarning)
    }

    /// Stop the daemon.
    pub fn quit(&self) -> Result<(), ControlError> {
        self.send(ControlCommand::Quit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_are_queued_in_order() {
        let (handle, mut rx) = ControlHandle::channel();
        handle.toggle_pause().unwrap();
        handle.request_set_threshold(30).unwrap();
        handle.request_cancel_warning().unwrap();
        handle.quit().unwrap();

        assert_eq!(rx.try_recv().unwrap(), ControlCommand::TogglePause);
        assert_eq!(
            rx.try_recv().unwrap(),
            ControlCommand::SetThreshold(Threshold::new(30).unwrap())
        );
        assert_eq!(rx.try_recv().unwrap(), ControlCommand::CancelWarning);
        assert_eq!(rx.try_recv().unwrap(), ControlCommand::Quit);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_threshold_rejected_at_boundary() {
        let (handle, mut rx) = ControlHandle::channel();
        assert_eq!(
            handle.request_set_threshold(4),
            Err(ControlError::InvalidThreshold(ThresholdError(4)))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (handle, rx) = ControlHandle::channel();
        drop(rx);
        assert_eq!(handle.quit(), Err(ControlError::Stopped));
    }
}
