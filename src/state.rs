//! Connection state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Streaming
//!                     |            |
//!                     v            v
//!                 Reconnecting <---+
//!                     |  ^
//!                     v  |
//!                  GivenUp (until reconnect)
//! ```
//!
//! Only the acquisition thread mutates the state; consumers get snapshots.

use crate::config::BackoffPolicy;
use crate::types::{ConnectionState, Phase};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

impl ConnectionState {
    /// Fresh attempt after start or an explicit reconnect.
    pub(crate) fn begin_connecting(&mut self) {
        self.phase = Phase::Connecting;
        self.consecutive_failures = 0;
    }

    /// Session opened and the streaming request was accepted.
    pub(crate) fn stream_opened(&mut self) {
        self.phase = Phase::Streaming;
        self.consecutive_failures = 0;
    }

    pub(crate) fn frame_published(&mut self, at: Instant) {
        self.last_success = Some(at);
    }

    /// Count one failure and move to `Reconnecting`, or `GivenUp` once the
    /// policy's ceiling is exceeded. Returns the new phase.
    pub(crate) fn record_failure(&mut self, policy: &BackoffPolicy) -> Phase {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.phase = if policy.exhausted(self.consecutive_failures) {
            Phase::GivenUp
        } else {
            Phase::Reconnecting
        };
        self.phase
    }

    pub(crate) fn stopped(&mut self) {
        self.phase = Phase::Disconnected;
    }
}

/// Connection state shared with consumers, with change notification.
#[derive(Debug, Default)]
pub(crate) struct StateCell {
    state: Mutex<ConnectionState>,
    changed: Condvar,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ConnectionState {
        *self.lock()
    }

    /// Mutate the state and wake all waiters. Returns the resulting snapshot.
    pub fn update<F: FnOnce(&mut ConnectionState)>(&self, f: F) -> ConnectionState {
        let snapshot = {
            let mut state = self.lock();
            f(&mut state);
            *state
        };
        self.changed.notify_all();
        snapshot
    }

    /// Block until `done` holds or `timeout` elapses. Returns the final value
    /// of `done`.
    pub fn wait_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&ConnectionState) -> bool,
    {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| !done(state))
            .unwrap_or_else(PoisonError::into_inner);
        done(&guard)
    }
}
