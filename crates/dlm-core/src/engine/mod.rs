//! Transfer engine contract.
//!
//! The scheduler never performs HTTP itself. It hands a [`TransferSource`] to a
//! [`TransferEngine`] together with a [`TransferSink`]; the engine reports
//! progress and exactly one terminal event (succeeded, failed or suspended)
//! through the sink. Transfer ids are minted by the scheduler before dispatch,
//! so an engine event can never arrive ahead of the handle it refers to.

mod control;
pub mod http;
mod sink;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub use self::control::{ControlFlag, ControlSignal, TransferControl};
pub use self::http::{CurlEngine, CurlOptions};
pub use self::sink::TransferSink;
pub(crate) use self::sink::EventSink;

/// Opaque handle for one dispatch of a task to the engine.
///
/// A task gets a fresh id every time it is (re)dispatched: on admission, on
/// each retry and on resume. Events carrying a superseded id are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    pub(crate) fn new(raw: u64) -> Self {
        TransferId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Base request for a transfer: URL plus caller-supplied headers and timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Whole-request timeout; expiry is reported as [`TransferErrorKind::Timeout`].
    pub timeout: Option<Duration>,
}

/// Opaque partial-transfer state produced by an engine on suspension.
///
/// Only the engine that produced a token knows how to interpret it.
#[derive(Clone, PartialEq, Eq)]
pub struct ResumeToken(Vec<u8>);

impl ResumeToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        ResumeToken(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResumeToken({} bytes)", self.0.len())
    }
}

/// What the engine is asked to do for one dispatch.
#[derive(Debug, Clone)]
pub enum TransferSource {
    /// Start from byte zero.
    Fresh(TransferRequest),
    /// Continue a suspended transfer. The token is consumed by this dispatch.
    Resume {
        request: TransferRequest,
        token: ResumeToken,
    },
}

impl TransferSource {
    pub fn request(&self) -> &TransferRequest {
        match self {
            TransferSource::Fresh(request) => request,
            TransferSource::Resume { request, .. } => request,
        }
    }

    pub fn resume_token(&self) -> Option<&ResumeToken> {
        match self {
            TransferSource::Fresh(_) => None,
            TransferSource::Resume { token, .. } => Some(token),
        }
    }
}

/// Completed transfer: a temporary file owned by whoever receives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Filename hint from the response (e.g. Content-Disposition).
    pub suggested_filename: Option<String>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Artifact {
            path: path.into(),
            suggested_filename: None,
        }
    }

    pub fn with_suggested_filename(mut self, name: impl Into<String>) -> Self {
        self.suggested_filename = Some(name.into());
        self
    }

    /// Best-effort removal of the temporary file.
    pub(crate) fn discard(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %self.path.display(), "discard artifact: {}", e);
            }
        }
    }
}

/// Classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    /// Connect or whole-request timeout.
    Timeout,
    /// DNS, connect, reset, short read and similar network failures.
    Connection,
    /// Response completed with a non-2xx status.
    Http(u16),
    /// The transfer was torn down by an abort request.
    Aborted,
    /// Transferred content failed checksum verification.
    Integrity,
    /// Local staging I/O failed.
    Io,
    Other,
}

impl fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferErrorKind::Timeout => write!(f, "timeout"),
            TransferErrorKind::Connection => write!(f, "connection"),
            TransferErrorKind::Http(code) => write!(f, "HTTP {}", code),
            TransferErrorKind::Aborted => write!(f, "aborted"),
            TransferErrorKind::Integrity => write!(f, "integrity"),
            TransferErrorKind::Io => write!(f, "io"),
            TransferErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Transport-level failure reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransferError {
    pub kind: TransferErrorKind,
    pub message: String,
}

impl TransferError {
    pub fn new(kind: TransferErrorKind, message: impl Into<String>) -> Self {
        TransferError {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Connection, message)
    }

    pub fn http(status: u16) -> Self {
        Self::new(TransferErrorKind::Http(status), "unexpected response status")
    }

    pub fn aborted() -> Self {
        Self::new(TransferErrorKind::Aborted, "transfer aborted")
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(TransferErrorKind::Integrity, message)
    }

    pub fn io(err: &std::io::Error) -> Self {
        Self::new(TransferErrorKind::Io, err.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransferErrorKind::Timeout
    }
}

/// Performs transfers on behalf of the scheduler.
///
/// Implementations must not call back into the sink while holding locks the
/// sink could need, and must deliver exactly one terminal event per `begin`.
/// All methods are expected to return promptly; the work itself happens
/// elsewhere (a thread, a runtime task, a test harness).
pub trait TransferEngine: Send + Sync + 'static {
    /// Start (or continue, for [`TransferSource::Resume`]) transfer `id`.
    fn begin(&self, id: TransferId, source: TransferSource, sink: TransferSink);

    /// Stop `id` without discarding partial state. The engine acknowledges
    /// with [`TransferSink::suspended`], carrying a token when the bytes
    /// transferred so far can be continued.
    fn suspend(&self, id: TransferId);

    /// Tear down `id`. Fire and forget: any event that follows is ignored.
    fn abort(&self, id: TransferId);

    /// Release whatever a token refers to (partial files etc.). Called for
    /// tokens that will never be resumed, e.g. when a paused task is cancelled.
    fn discard_token(&self, token: ResumeToken) {
        let _ = token;
    }
}
