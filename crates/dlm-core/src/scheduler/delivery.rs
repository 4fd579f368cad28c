//! Per-task ordering of user callbacks.
//!
//! Progress callbacks run outside the registry lock, so without help a
//! progress callback on an engine thread could still be running (or not yet
//! started) when another thread fires the completion. The gate makes
//! completion wait for an in-flight progress callback and turns away any
//! progress that arrives afterwards.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    /// Thread currently inside a progress callback.
    delivering: Option<ThreadId>,
}

#[derive(Debug, Default)]
pub(crate) struct DeliveryGate {
    state: Mutex<GateState>,
    idle: Condvar,
}

impl DeliveryGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `deliver` unless the task has completed. Returns whether it ran.
    pub fn progress(&self, deliver: impl FnOnce()) -> bool {
        let me = thread::current().id();
        let mut state = self.lock();
        if state.delivering == Some(me) {
            // progress reported from inside a progress callback
            if state.closed {
                return false;
            }
            drop(state);
            deliver();
            return true;
        }
        while state.delivering.is_some() {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return false;
        }
        state.delivering = Some(me);
        drop(state);

        let _done = Delivering(self);
        deliver();
        true
    }

    /// Marks the task completed, waiting for a progress callback running on
    /// another thread. A completion fired from inside the task's own progress
    /// callback does not wait.
    pub fn close(&self) {
        let me = thread::current().id();
        let mut state = self.lock();
        state.closed = true;
        while let Some(owner) = state.delivering {
            if owner == me {
                break;
            }
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Clears the in-flight marker even if the callback panics.
struct Delivering<'a>(&'a DeliveryGate);

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        self.0.lock().delivering = None;
        self.0.idle.notify_all();
    }
}
