//! Per-dispatch event sink handed to the engine.

use std::fmt;
use std::sync::{Arc, Weak};

use super::{Artifact, ResumeToken, TransferError, TransferId};

/// Receiver side of engine events (implemented by the scheduler).
pub(crate) trait EventSink: Send + Sync {
    fn on_progress(&self, target: &Arc<str>, transfer: TransferId, written: u64, expected: u64);
    fn on_succeeded(&self, target: &Arc<str>, transfer: TransferId, artifact: Artifact);
    fn on_failed(&self, target: &Arc<str>, transfer: TransferId, error: TransferError);
    fn on_suspended(&self, target: &Arc<str>, transfer: TransferId, token: Option<ResumeToken>);
}

/// Where an engine reports what happened to one transfer.
///
/// Holds only a weak reference to the scheduler and addresses the task by
/// target + transfer id, so an engine can keep a sink around indefinitely
/// without keeping tasks alive. Events for tasks that are gone, or for a
/// transfer id that has been superseded, are dropped by the scheduler.
#[derive(Clone)]
pub struct TransferSink {
    events: Weak<dyn EventSink>,
    target: Arc<str>,
    transfer: TransferId,
}

impl TransferSink {
    pub(crate) fn new(events: Weak<dyn EventSink>, target: Arc<str>, transfer: TransferId) -> Self {
        TransferSink {
            events,
            target,
            transfer,
        }
    }

    pub fn transfer_id(&self) -> TransferId {
        self.transfer
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Bytes written so far out of `expected` (0 when the total is unknown).
    pub fn progress(&self, written: u64, expected: u64) {
        if let Some(events) = self.events.upgrade() {
            events.on_progress(&self.target, self.transfer, written, expected);
        }
    }

    pub fn succeeded(&self, artifact: Artifact) {
        match self.events.upgrade() {
            Some(events) => events.on_succeeded(&self.target, self.transfer, artifact),
            None => artifact.discard(),
        }
    }

    pub fn failed(&self, error: TransferError) {
        if let Some(events) = self.events.upgrade() {
            events.on_failed(&self.target, self.transfer, error);
        }
    }

    /// Acknowledges a suspend request.
    pub fn suspended(&self, token: Option<ResumeToken>) {
        if let Some(events) = self.events.upgrade() {
            events.on_suspended(&self.target, self.transfer, token);
        }
    }
}

impl fmt::Debug for TransferSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSink")
            .field("target", &self.target)
            .field("transfer", &self.transfer)
            .finish()
    }
}
