//! Domain types for idle tracking and shutdown warnings.

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Local;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Smallest idle threshold accepted, in seconds.
pub const MIN_THRESHOLD_SECONDS: u64 = 5;

/// Threshold rejected at the input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Idle threshold must be at least {MIN_THRESHOLD_SECONDS} seconds (got {0})")]
pub struct ThresholdError(pub u64);

/// Idle threshold in whole seconds (newtype, always `>= MIN_THRESHOLD_SECONDS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Threshold(u64);

impl Threshold {
    /// Validate and wrap a threshold.
    pub fn new(seconds: u64) -> Result<Self, ThresholdError> {
        if seconds < MIN_THRESHOLD_SECONDS {
            return Err(ThresholdError(seconds));
        }
        Ok(Self(seconds))
    }

    /// Get the threshold in seconds.
    pub fn as_secs(self) -> u64 {
        self.0
    }

    /// Whether an idle reading has reached this threshold.
    #[allow(clippy::cast_precision_loss)]
    pub fn is_reached_by(self, idle_seconds: f64) -> bool {
        idle_seconds >= self.0 as f64
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// What happens after a cancel when idle time is still above the threshold.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    /// The next tick may start a new session straight away.
    #[default]
    Immediate,
    /// A reading below the threshold must be seen first.
    AfterActivity,
}

/// A live shutdown warning.
///
/// Created when the idle threshold is crossed; ends on cancel. The OS
/// shutdown firing ends it too, but this process does not outlive that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningSession {
    /// Wall-clock start, for display.
    pub started_at: DateTime<Local>,

    /// Monotonic start, for countdowns.
    pub started: Instant,

    /// Threshold in force when the session began.
    pub threshold: Threshold,

    /// Delay handed to the shutdown command.
    pub delay: Duration,

    /// Set once the session has been canceled.
    pub canceled: bool,
}

impl WarningSession {
    /// Start a new session now.
    pub fn begin(threshold: Threshold, delay: Duration) -> Self {
        Self {
            started_at: Local::now(),
            started: Instant::now(),
            threshold,
            delay,
            canceled: false,
        }
    }

    /// When the OS shutdown is expected to fire.
    pub fn deadline(&self) -> Instant {
        self.started + self.delay
    }

    /// Time left before the expected shutdown (zero once due).
    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }
}

/// Result of a single monitor tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Monitoring is paused; the idle source was not queried.
    Paused,
    /// Idle time below threshold.
    Active { idle_seconds: f64 },
    /// Idle time at or above threshold, but a session is already live
    /// (or re-arming waits for activity).
    AlreadyWarning { idle_seconds: f64 },
    /// A new warning session was started by this tick.
    WarningStarted { idle_seconds: f64 },
}

/// Result of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The live session was ended and an abort was requested.
    Canceled(WarningSession),
    /// Nothing to cancel.
    NoActiveWarning,
}

/// Advisory notices for whatever UI presents the countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningNotice {
    /// A warning began; shutdown expected after `delay`.
    Started { session: WarningSession },
    /// The warning was canceled.
    Canceled,
}
