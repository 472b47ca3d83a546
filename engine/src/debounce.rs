//! Debounce scheduling for outbound reconciliation.
//!
//! [`DebounceState`] is the pure decision logic, driven by explicit instants.
//! [`Debouncer`] runs it on a tokio timer task and invokes the action.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// When a burst of notifications triggers the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DebounceMode {
    /// Run once the window passes without notifications.
    Trailing,
    /// Run on the first notification, then once more at window expiry if
    /// further notifications arrived.
    #[default]
    LeadingTrailing,
}

/// What to do after a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// Run the action now and arm the timer.
    RunAndArm,
    /// Arm the timer only.
    Arm,
    /// A timer is already armed; the notification was folded into it.
    Coalesced,
}

/// What to do when the timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Notifications arrived since arming; sleep this much longer.
    Wait(Duration),
    /// Window elapsed; run the action. The timer is disarmed.
    Run,
    /// Window elapsed with nothing to run. The timer is disarmed.
    Idle,
}

/// Pending-call state for one debounced action.
#[derive(Debug, Clone)]
pub struct DebounceState {
    window: Duration,
    mode: DebounceMode,
    last_notified: Option<Instant>,
    armed: bool,
    trailing_pending: bool,
}

impl DebounceState {
    pub fn new(window: Duration, mode: DebounceMode) -> Self {
        Self {
            window,
            mode,
            last_notified: None,
            armed: false,
            trailing_pending: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn on_notify(&mut self, now: Instant) -> Notify {
        self.last_notified = Some(now);
        if self.armed {
            self.trailing_pending = true;
            return Notify::Coalesced;
        }
        self.armed = true;
        match self.mode {
            DebounceMode::LeadingTrailing => {
                self.trailing_pending = false;
                Notify::RunAndArm
            }
            DebounceMode::Trailing => {
                self.trailing_pending = true;
                Notify::Arm
            }
        }
    }

    pub fn on_timer(&mut self, now: Instant) -> Tick {
        let elapsed = self
            .last_notified
            .map_or(self.window, |last| now.saturating_duration_since(last));
        if elapsed < self.window {
            return Tick::Wait(self.window - elapsed);
        }
        self.armed = false;
        if std::mem::take(&mut self.trailing_pending) {
            Tick::Run
        } else {
            Tick::Idle
        }
    }

    /// Forgets any pending run.
    pub fn reset(&mut self) {
        self.armed = false;
        self.trailing_pending = false;
        self.last_notified = None;
    }
}

type Action = Arc<dyn Fn() + Send + Sync>;

/// Coalesces notifications into calls of `action`, at most one pending run
/// at a time.
pub struct Debouncer {
    state: Arc<Mutex<DebounceState>>,
    action: Action,
    runtime: Handle,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new<F>(window: Duration, mode: DebounceMode, runtime: Handle, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(DebounceState::new(window, mode))),
            action: Arc::new(action),
            runtime,
            timer: Mutex::new(None),
        }
    }

    /// Signals that the watched data may have changed.
    pub fn notify(&self) {
        let decision = self.state.lock().on_notify(Instant::now());
        match decision {
            Notify::RunAndArm => {
                self.arm();
                (self.action)();
            }
            Notify::Arm => self.arm(),
            Notify::Coalesced => {}
        }
    }

    /// Whether a timer is currently armed.
    pub fn is_pending(&self) -> bool {
        self.state.lock().is_armed()
    }

    /// Stops the timer and drops any pending run.
    pub fn cancel(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        self.state.lock().reset();
    }

    fn arm(&self) {
        let state = Arc::clone(&self.state);
        let action = Arc::clone(&self.action);
        let mut wait = state.lock().window();
        let timer = self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(wait).await;
                let tick = state.lock().on_timer(Instant::now());
                match tick {
                    Tick::Wait(remaining) => wait = remaining,
                    Tick::Run => {
                        action();
                        break;
                    }
                    Tick::Idle => break,
                }
            }
        });
        if let Some(previous) = self.timer.lock().replace(timer) {
            // A finished timer; aborting is a no-op.
            previous.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
