//! Shutdown warning state machine.
//!
//! `Idle` (no session) -> `Warning` (shutdown command issued, countdown
//! running) -> `Idle`, either through a user cancel or through the OS
//! executing the shutdown. The OS command is the authoritative timer; the
//! countdown published to the UI is advisory only.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::domain::CancelOutcome;
use crate::domain::RearmPolicy;
use crate::domain::WarningNotice;
use crate::domain::WarningSession;
use crate::event_log::EventLog;
use crate::shutdown::ShutdownAction;
use crate::state::SharedState;

const NOTICE_CAPACITY: usize = 16;

/// Owns the live warning session and talks to the shutdown action.
pub struct WarningController {
    state: SharedState,
    action: Arc<dyn ShutdownAction>,
    log: EventLog,
    delay: Duration,
    rearm: RearmPolicy,
    notices: broadcast::Sender<WarningNotice>,

    /// In-flight start command, awaited before an abort so the two never
    /// reach the OS out of order.
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl WarningController {
    /// Create a controller.
    pub fn new(
        state: SharedState,
        action: Arc<dyn ShutdownAction>,
        log: EventLog,
        delay: Duration,
        rearm: RearmPolicy,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            state,
            action,
            log,
            delay,
            rearm,
            notices,
            dispatch: Mutex::new(None),
        }
    }

    /// Delay handed to the shutdown command.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Subscribe to warning notices (for the countdown prompt).
    pub fn subscribe(&self) -> broadcast::Receiver<WarningNotice> {
        self.notices.subscribe()
    }

    /// Enter the warning state for a session already recorded in the
    /// monitor state.
    ///
    /// Issues the delayed shutdown on its own task and publishes the
    /// countdown notice; returns without waiting for either.
    pub fn begin(&self, session: WarningSession) {
        self.log.log_event("Issuing shutdown command.");

        let action = Arc::clone(&self.action);
        let log = self.log.clone();
        let delay = session.delay;
        let handle = tokio::spawn(async move {
            if let Err(e) = action.start_delayed_shutdown(delay).await {
                // Session stays active: a failed launch is indistinguishable
                // from a silent OS failure, so there is no rollback.
                log.log_event(format!("Failed to issue shutdown command: {e}"));
            }
        });

        if let Some(previous) = self.lock_dispatch().replace(handle) {
            previous.abort();
        }

        if self.notices.send(WarningNotice::Started { session }).is_err() {
            debug!("No warning prompt subscribed");
        }
    }

    /// Cancel the live session.
    ///
    /// Ends the session and requests an abort exactly once; further calls
    /// return `NoActiveWarning` without touching the shutdown action.
    ///
    /// The session stays in the monitor state, marked canceled, until the
    /// abort has returned. Until then the monitor sees a live warning and
    /// cannot start a session whose shutdown this abort would undo.
    pub async fn cancel(&self) -> CancelOutcome {
        let session = {
            let mut state = self.state.lock();
            match state.session.as_mut() {
                Some(session) if !session.canceled => {
                    session.canceled = true;
                    session.clone()
                }
                _ => {
                    debug!("Cancel requested with no active warning");
                    return CancelOutcome::NoActiveWarning;
                }
            }
        };

        self.log.log_event("Shutdown canceled by user.");

        let pending = self.lock_dispatch().take();
        if let Some(handle) = pending
            && let Err(e) = handle.await
        {
            warn!("Shutdown dispatch task failed: {}", e);
        }

        // Best effort: if the OS is already shutting down, it wins.
        if let Err(e) = self.action.abort_shutdown().await {
            self.log.log_event(format!("Failed to abort shutdown: {e}"));
        }

        {
            let mut state = self.state.lock();
            state.session = None;
            if self.rearm == RearmPolicy::AfterActivity {
                state.awaiting_activity = true;
            }
        }

        if self.notices.send(WarningNotice::Canceled).is_err() {
            debug!("No warning prompt subscribed");
        }

        CancelOutcome::Canceled(session)
    }

    fn lock_dispatch(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.dispatch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Threshold;
    use crate::mock::RecordingShutdown;
    use crate::mock::ShutdownCall;
    use crate::state::MonitorState;

    struct Fixture {
        state: SharedState,
        action: Arc<RecordingShutdown>,
        log: EventLog,
        controller: WarningController,
    }

    fn fixture(rearm: RearmPolicy) -> Fixture {
        let state = SharedState::new(MonitorState::new(Threshold::new(10).unwrap(), false));
        let action = Arc::new(RecordingShutdown::new());
        let log = EventLog::in_memory();
        let controller = WarningController::new(
            state.clone(),
            action.clone(),
            log.clone(),
            Duration::from_secs(60),
            rearm,
        );
        Fixture {
            state,
            action,
            log,
            controller,
        }
    }

    fn start_session(f: &Fixture) {
        let session = WarningSession::begin(f.state.threshold(), f.controller.delay());
        f.state.lock().session = Some(session.clone());
        f.controller.begin(session);
    }

    #[tokio::test]
    async fn test_begin_issues_delayed_shutdown() {
        let f = fixture(RearmPolicy::Immediate);
        let mut notices = f.controller.subscribe();

        start_session(&f);
        f.action.wait_for_calls(1).await;

        assert_eq!(
            f.action.calls(),
            vec![ShutdownCall::Start(Duration::from_secs(60))]
        );
        assert!(matches!(
            notices.recv().await.unwrap(),
            WarningNotice::Started { .. }
        ));
        assert_eq!(f.log.messages(), vec!["Issuing shutdown command."]);
        assert!(f.state.warning_active());
    }

    #[tokio::test]
    async fn test_cancel_aborts_once() {
        let f = fixture(RearmPolicy::Immediate);
        start_session(&f);

        let first = f.controller.cancel().await;
        let second = f.controller.cancel().await;

        match first {
            CancelOutcome::Canceled(session) => assert!(session.canceled),
            CancelOutcome::NoActiveWarning => panic!("expected a canceled session"),
        }
        assert_eq!(second, CancelOutcome::NoActiveWarning);
        assert_eq!(
            f.action.calls(),
            vec![
                ShutdownCall::Start(Duration::from_secs(60)),
                ShutdownCall::Abort
            ]
        );
        assert!(!f.state.warning_active());
        assert_eq!(
            f.log
                .messages()
                .iter()
                .filter(|m| *m == "Shutdown canceled by user.")
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_held_until_abort_returns() {
        let f = Arc::new(fixture(RearmPolicy::Immediate));
        f.action.slow_abort(Duration::from_millis(200));
        start_session(&f);
        f.action.wait_for_calls(1).await;

        let canceling = Arc::clone(&f);
        let cancel = tokio::spawn(async move { canceling.controller.cancel().await });
        f.action.wait_for_calls(2).await;

        assert!(f.state.warning_active());
        assert!(f.state.lock().session.as_ref().unwrap().canceled);
        assert_eq!(f.controller.cancel().await, CancelOutcome::NoActiveWarning);

        assert!(matches!(cancel.await.unwrap(), CancelOutcome::Canceled(_)));
        assert!(!f.state.warning_active());
        assert_eq!(f.action.aborts(), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_session_is_noop() {
        let f = fixture(RearmPolicy::Immediate);
        assert_eq!(f.controller.cancel().await, CancelOutcome::NoActiveWarning);
        assert!(f.action.calls().is_empty());
        assert!(f.log.messages().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_keeps_session() {
        let f = fixture(RearmPolicy::Immediate);
        f.action.fail_start(true);

        start_session(&f);
        f.action.wait_for_calls(1).await;
        let dispatch = f.controller.lock_dispatch().take().unwrap();
        dispatch.await.unwrap();

        assert!(f.state.warning_active());
        assert!(
            f.log
                .messages()
                .iter()
                .any(|m| m.starts_with("Failed to issue shutdown command:"))
        );
    }

    #[tokio::test]
    async fn test_abort_failure_still_ends_session() {
        let f = fixture(RearmPolicy::Immediate);
        f.action.fail_abort(true);
        start_session(&f);

        assert!(matches!(
            f.controller.cancel().await,
            CancelOutcome::Canceled(_)
        ));
        assert!(!f.state.warning_active());
        assert!(
            f.log
                .messages()
                .iter()
                .any(|m| m.starts_with("Failed to abort shutdown:"))
        );
    }

    #[tokio::test]
    async fn test_cancel_publishes_notice() {
        let f = fixture(RearmPolicy::Immediate);
        let mut notices = f.controller.subscribe();
        start_session(&f);
        f.controller.cancel().await;

        assert!(matches!(
            notices.recv().await.unwrap(),
            WarningNotice::Started { .. }
        ));
        assert_eq!(notices.recv().await.unwrap(), WarningNotice::Canceled);
    }

    #[tokio::test]
    async fn test_rearm_after_activity_sets_flag() {
        let f = fixture(RearmPolicy::AfterActivity);
        start_session(&f);
        f.controller.cancel().await;
        assert!(f.state.lock().awaiting_activity);

        let g = fixture(RearmPolicy::Immediate);
        start_session(&g);
        g.controller.cancel().await;
        assert!(!g.state.lock().awaiting_activity);
    }
}
