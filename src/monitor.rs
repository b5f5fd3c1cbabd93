//! Idle monitor.
//!
//! Polls the idle source on a fixed cadence and starts at most one warning
//! session at a time. Threshold crossing is edge-triggered on the session:
//! while a session is live, further readings above the threshold are
//! ignored, and the session only ends through the warning controller.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::domain::Threshold;
use crate::domain::TickOutcome;
use crate::domain::WarningSession;
use crate::event_log::EventLog;
use crate::idle::IdleSource;
use crate::state::SharedState;
use crate::warning::WarningController;

/// Idle monitor.
pub struct IdleMonitor {
    state: SharedState,
    source: Arc<dyn IdleSource>,
    controller: Arc<WarningController>,
    log: EventLog,
}

impl IdleMonitor {
    /// Create a new idle monitor.
    pub fn new(
        state: SharedState,
        source: Arc<dyn IdleSource>,
        controller: Arc<WarningController>,
        log: EventLog,
    ) -> Self {
        Self {
            state,
            source,
            controller,
            log,
        }
    }

    /// Shared state handle.
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Run one poll step.
    pub async fn tick(&self) -> TickOutcome {
        if self.state.is_paused() {
            trace!("Paused, skipping idle check");
            return TickOutcome::Paused;
        }

        let idle_seconds = self.source.idle_seconds().await;

        let session = {
            let mut state = self.state.lock();
            // Pause may have landed while the source was queried.
            if state.paused {
                return TickOutcome::Paused;
            }

            if !state.idle_threshold.is_reached_by(idle_seconds) {
                trace!("Idle {:.1}s below threshold {}", idle_seconds, state.idle_threshold);
                state.awaiting_activity = false;
                return TickOutcome::Active { idle_seconds };
            }

            // A session being canceled still counts until its abort returns.
            if state.warning_active() || state.awaiting_activity {
                trace!("Idle {:.1}s, warning already handled", idle_seconds);
                return TickOutcome::AlreadyWarning { idle_seconds };
            }

            let session = WarningSession::begin(state.idle_threshold, self.controller.delay());
            state.session = Some(session.clone());
            session
        };

        self.log.log_event(format!(
            "Idle for {} seconds. Showing shutdown warning.",
            session.threshold.as_secs()
        ));
        self.controller.begin(session);

        TickOutcome::WarningStarted { idle_seconds }
    }

    /// Pause or resume polling.
    ///
    /// An active warning session is left alone either way. Returns false if
    /// the value was unchanged.
    pub fn set_paused(&self, paused: bool) -> bool {
        {
            let mut state = self.state.lock();
            if state.paused == paused {
                return false;
            }
            state.paused = paused;
        }
        self.log.log_event(if paused { "Paused" } else { "Resumed" });
        true
    }

    /// Flip the paused flag, returning the new value.
    pub fn toggle_pause(&self) -> bool {
        let paused = {
            let mut state = self.state.lock();
            state.paused = !state.paused;
            state.paused
        };
        self.log.log_event(if paused { "Paused" } else { "Resumed" });
        paused
    }

    /// Replace the idle threshold; applies from the next tick.
    pub fn set_threshold(&self, threshold: Threshold) {
        self.state.lock().idle_threshold = threshold;
        self.log.log_event(format!(
            "Idle threshold set to {} seconds.",
            threshold.as_secs()
        ));
    }

    /// Poll every `interval` until `shutdown` is canceled.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!(
            "Idle monitor started ({} backend), polling every {:?}",
            self.source.name(),
            interval
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Idle monitor stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    trace!("Tick: {:?}", outcome);
                }
            }
        }
    }
}
