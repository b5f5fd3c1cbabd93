//! Test doubles for the idle source and shutdown action.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::idle::IdleSource;
use crate::shutdown::ShutdownAction;
use crate::shutdown::ShutdownError;

/// Idle source that replays a script of readings.
///
/// Once the script is exhausted the last reading repeats.
#[derive(Debug, Default)]
pub struct ScriptedIdleSource {
    readings: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
    queries: AtomicUsize,
}

impl ScriptedIdleSource {
    /// Source that returns `readings` in order.
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().collect()),
            last: Mutex::new(0.0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Number of times the source was queried.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdleSource for ScriptedIdleSource {
    async fn idle_seconds(&self) -> f64 {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.readings.lock().unwrap().pop_front() {
            *last = next;
        }
        *last
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// A call made to [`RecordingShutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCall {
    Start(Duration),
    Abort,
}

/// Shutdown action that records calls instead of running commands.
#[derive(Debug, Default)]
pub struct RecordingShutdown {
    calls: Mutex<Vec<ShutdownCall>>,
    notify: Notify,

    /// Configure start to fail
    fail_start: AtomicBool,

    /// Configure abort to fail
    fail_abort: AtomicBool,

    /// Time an abort takes to return, after it is recorded
    abort_delay: Mutex<Duration>,
}

impl RecordingShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls so far, in order.
    pub fn calls(&self) -> Vec<ShutdownCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Count of abort calls.
    pub fn aborts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == ShutdownCall::Abort)
            .count()
    }

    /// Count of start calls.
    pub fn starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ShutdownCall::Start(_)))
            .count()
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_abort(&self, fail: bool) {
        self.fail_abort.store(fail, Ordering::SeqCst);
    }

    /// Make each abort take `delay` before returning.
    pub fn slow_abort(&self, delay: Duration) {
        *self.abort_delay.lock().unwrap() = delay;
    }

    /// Wait until at least `n` calls have been recorded.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            if self.calls.lock().unwrap().len() >= n {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, call: ShutdownCall) {
        self.calls.lock().unwrap().push(call);
        self.notify.notify_waiters();
    }

    fn simulated_failure() -> ShutdownError {
        ShutdownError::Spawn {
            program: "shutdown".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock failure"),
        }
    }
}

#[async_trait]
impl ShutdownAction for RecordingShutdown {
    async fn start_delayed_shutdown(&self, delay: Duration) -> Result<(), ShutdownError> {
        self.record(ShutdownCall::Start(delay));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        Ok(())
    }

    async fn abort_shutdown(&self) -> Result<(), ShutdownError> {
        self.record(ShutdownCall::Abort);
        let delay = *self.abort_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(Self::simulated_failure());
        }
        Ok(())
    }
}
