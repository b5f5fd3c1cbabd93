//! Process-wide monitor state shared by the poll loop and control handlers.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use chrono::DateTime;
use chrono::Local;

use crate::domain::Threshold;
use crate::domain::WarningSession;

/// Mutable monitor state.
///
/// `warning_active` is derived from `session`, so it cannot drift from the
/// session it describes.
#[derive(Debug)]
pub struct MonitorState {
    /// Polling suspended by the user.
    pub paused: bool,

    /// Idle time needed to start a warning.
    pub idle_threshold: Threshold,

    /// The live warning session, if any. A canceled session stays here
    /// until its abort has returned.
    pub session: Option<WarningSession>,

    /// Set after a cancel when re-arming waits for user activity.
    pub awaiting_activity: bool,
}

impl MonitorState {
    /// Create state with the given threshold.
    pub fn new(idle_threshold: Threshold, paused: bool) -> Self {
        Self {
            paused,
            idle_threshold,
            session: None,
            awaiting_activity: false,
        }
    }

    /// Whether a warning session is live.
    pub fn warning_active(&self) -> bool {
        self.session.is_some()
    }
}

/// Read-only copy of the state for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub paused: bool,
    pub idle_threshold: Threshold,
    pub warning_active: bool,
    pub warning_started_at: Option<DateTime<Local>>,
}

/// Cloneable handle to the shared state.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<MonitorState>>,
}

impl SharedState {
    /// Wrap initial state.
    pub fn new(state: MonitorState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Lock the state.
    ///
    /// A poisoned lock still holds consistent data (every critical section
    /// is a handful of field writes), so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Take a snapshot.
    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.lock();
        StateSnapshot {
            paused: state.paused,
            idle_threshold: state.idle_threshold,
            warning_active: state.warning_active(),
            warning_started_at: state.session.as_ref().map(|s| s.started_at),
        }
    }

    /// Whether monitoring is paused.
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Whether a warning session is live.
    pub fn warning_active(&self) -> bool {
        self.lock().warning_active()
    }

    /// Current threshold.
    pub fn threshold(&self) -> Threshold {
        self.lock().idle_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn threshold(secs: u64) -> Threshold {
        Threshold::new(secs).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let state = SharedState::new(MonitorState::new(threshold(3600), false));
        let snapshot = state.snapshot();
        assert!(!snapshot.paused);
        assert!(!snapshot.warning_active);
        assert_eq!(snapshot.idle_threshold.as_secs(), 3600);
        assert!(snapshot.warning_started_at.is_none());
    }

    #[test]
    fn test_warning_active_follows_session() {
        let state = SharedState::new(MonitorState::new(threshold(10), false));
        assert!(!state.warning_active());

        state.lock().session = Some(WarningSession::begin(threshold(10), Duration::from_secs(60)));
        assert!(state.warning_active());
        assert!(state.snapshot().warning_started_at.is_some());

        state.lock().session = None;
        assert!(!state.warning_active());
    }

    #[test]
    fn test_clones_share_state() {
        let state = SharedState::new(MonitorState::new(threshold(10), true));
        let other = state.clone();
        assert!(other.is_paused());

        state.lock().paused = false;
        assert!(!other.is_paused());
    }
}
