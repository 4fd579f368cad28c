//! One download's lifecycle.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::delivery::DeliveryGate;
use crate::engine::{ResumeToken, TransferId, TransferRequest};
use crate::error::DownloadError;
use crate::options::DownloadOptions;

pub(crate) type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;
pub(crate) type CompletionCallback = Box<dyn FnOnce(Result<PathBuf, DownloadError>) + Send>;

/// Externally visible state of a download.
///
/// Terminal states are reported through the completion callback only; a
/// task in a terminal state is no longer registered, so [`Scheduler::state`]
/// never returns one.
///
/// [`Scheduler::state`]: super::Scheduler::state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Paused,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Where a registered task is. A resume token and a live transfer are never
/// held together: tokens only live in `Queued` and `Paused`.
#[derive(Debug)]
pub(crate) enum Phase {
    /// Waiting for a slot; carries a token when a resume was deferred.
    Queued { token: Option<ResumeToken> },
    /// Engine is transferring.
    Running { transfer: TransferId },
    /// Retry delay; `transfer` is the id the retry will use.
    Backoff { transfer: TransferId },
    /// Suspend requested, waiting for the engine to acknowledge.
    Suspending { transfer: TransferId, resume_pending: bool },
    /// Transfer done, verifying the checksum.
    Finishing { transfer: TransferId },
    Paused { token: Option<ResumeToken> },
}

impl Phase {
    pub fn state(&self) -> TaskState {
        match self {
            Phase::Queued { .. } => TaskState::Queued,
            Phase::Paused { .. } => TaskState::Paused,
            Phase::Running { .. }
            | Phase::Backoff { .. }
            | Phase::Suspending { .. }
            | Phase::Finishing { .. } => TaskState::Running,
        }
    }

    /// Whether this phase counts against the concurrency limit.
    pub fn holds_slot(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn transfer(&self) -> Option<TransferId> {
        match self {
            Phase::Running { transfer }
            | Phase::Backoff { transfer }
            | Phase::Suspending { transfer, .. }
            | Phase::Finishing { transfer } => Some(*transfer),
            Phase::Queued { .. } | Phase::Paused { .. } => None,
        }
    }

    pub fn take_token(&mut self) -> Option<ResumeToken> {
        match self {
            Phase::Queued { token } | Phase::Paused { token } => token.take(),
            _ => None,
        }
    }
}

pub(crate) struct Task {
    pub target: Arc<str>,
    pub options: DownloadOptions,
    pub request: TransferRequest,
    pub phase: Phase,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Highest fraction delivered so far; progress never goes backwards.
    pub last_progress: Option<f64>,
    pub on_progress: ProgressCallback,
    pub delivery: Arc<DeliveryGate>,
    /// Taken exactly once, when the task leaves the registry.
    pub on_completion: Option<CompletionCallback>,
}

impl Task {
    pub fn new(
        target: Arc<str>,
        options: DownloadOptions,
        max_retries: u32,
        on_progress: ProgressCallback,
        on_completion: CompletionCallback,
    ) -> Self {
        let request = TransferRequest {
            url: target.to_string(),
            headers: options.headers.clone(),
            timeout: options.timeout(),
        };
        Task {
            target,
            options,
            request,
            phase: Phase::Queued { token: None },
            retry_count: 0,
            max_retries,
            last_progress: None,
            on_progress,
            delivery: Arc::default(),
            on_completion: Some(on_completion),
        }
    }

    /// Progress fraction to deliver for `written` of `expected` bytes, if any.
    ///
    /// Unknown totals, out-of-range values and anything below what was
    /// already delivered are dropped.
    pub fn accept_progress(&mut self, written: u64, expected: u64) -> Option<f64> {
        if expected == 0 {
            return None;
        }
        let fraction = written as f64 / expected as f64;
        if !(0.0..=1.0).contains(&fraction) {
            return None;
        }
        if self.last_progress.is_some_and(|last| fraction < last) {
            return None;
        }
        self.last_progress = Some(fraction);
        Some(fraction)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("target", &self.target)
            .field("phase", &self.phase)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
