//! Awaitable handle for a single download.

use std::path::PathBuf;
use tokio::sync::{oneshot, watch};

use crate::error::DownloadError;

/// Returned by [`Scheduler::download`](super::Scheduler::download).
///
/// Dropping the handle does not cancel the download.
#[derive(Debug)]
pub struct DownloadHandle {
    target: String,
    progress: watch::Receiver<f64>,
    result: oneshot::Receiver<Result<PathBuf, DownloadError>>,
}

impl DownloadHandle {
    pub(super) fn new(
        target: String,
        progress: watch::Receiver<f64>,
        result: oneshot::Receiver<Result<PathBuf, DownloadError>>,
    ) -> Self {
        DownloadHandle {
            target,
            progress,
            result,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Latest progress fraction; starts at 0.0.
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    /// Final path, or why the download ended without one.
    pub async fn wait(self) -> Result<PathBuf, DownloadError> {
        self.result.await.unwrap_or(Err(DownloadError::Cancelled))
    }
}
