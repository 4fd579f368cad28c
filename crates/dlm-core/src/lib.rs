//! Concurrent download manager core.
//!
//! [`Scheduler`] coordinates downloads: one task per target URL, a bounded
//! number of concurrent transfers, pause/resume/cancel, and retries. The
//! HTTP work is done by a [`TransferEngine`] ([`CurlEngine`] in production)
//! and finished files are moved into place by a [`StoragePlacer`]
//! ([`FsPlacer`]).

pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod options;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod url_model;

pub use config::DlmConfig;
pub use engine::{
    Artifact, CurlEngine, CurlOptions, ResumeToken, TransferEngine, TransferError,
    TransferErrorKind, TransferId, TransferRequest, TransferSink, TransferSource,
};
pub use error::DownloadError;
pub use options::DownloadOptions;
pub use retry::RetryPolicy;
pub use scheduler::{DownloadHandle, Scheduler, SchedulerBuilder, SchedulerConfig, TaskState};
pub use storage::{FsPlacer, PlacementError, StoragePlacer};
