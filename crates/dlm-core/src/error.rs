//! Errors reported to completion callbacks.

use thiserror::Error;

use crate::engine::TransferError;
use crate::storage::PlacementError;

/// Terminal failure of a download, or a rejected `start`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DownloadError {
    /// The target is not an absolute http(s) URL.
    #[error("invalid target `{target}`: {reason}")]
    InvalidInput { target: String, reason: String },

    #[error("max_retries must be >= 0 (got {0})")]
    InvalidRetryCount(i32),

    /// A download for this target is already registered.
    #[error("download already in progress: {0}")]
    DuplicateDownload(String),

    /// Transport failure after the retry budget was spent.
    #[error("transfer failed: {0}")]
    Transport(TransferError),

    /// Like `Transport`, but the last attempt timed out.
    #[error("transfer timed out: {0}")]
    Timeout(TransferError),

    /// The artifact could not be moved to its destination.
    #[error("could not place downloaded file: {0}")]
    PlacementFailed(#[from] PlacementError),

    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }

    /// The underlying transport error, if this failure came from the engine.
    pub fn transfer_error(&self) -> Option<&TransferError> {
        match self {
            DownloadError::Transport(e) | DownloadError::Timeout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransferError> for DownloadError {
    fn from(e: TransferError) -> Self {
        if e.is_timeout() {
            DownloadError::Timeout(e)
        } else {
            DownloadError::Transport(e)
        }
    }
}
