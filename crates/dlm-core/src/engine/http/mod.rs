//! libcurl-backed [`TransferEngine`].
//!
//! Each transfer runs on the runtime's blocking pool with a plain `Easy`
//! handle and streams into a staging file. Suspend and abort raise the
//! transfer's [`ControlFlag`](crate::engine::ControlFlag); the progress
//! callback sees the flag and stops libcurl. A suspended transfer keeps its
//! staging file and hands back a token; resuming continues with a Range
//! request guarded by `If-Range`.

mod headers;
mod token;
mod transfer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use super::{ControlSignal, ResumeToken, TransferControl, TransferEngine, TransferId, TransferSink, TransferSource};
use crate::config::DlmConfig;
use token::ResumeData;
use transfer::{Outcome, TransferJob};

/// User-Agent sent when the config does not set one.
pub const DEFAULT_USER_AGENT: &str = concat!("dlm/", env!("CARGO_PKG_VERSION"));

/// libcurl settings applied to every transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Abort when under 1 KiB/s for this long.
    pub low_speed_time: Duration,
    pub max_redirections: u32,
    pub user_agent: String,
}

impl Default for CurlOptions {
    fn default() -> Self {
        CurlOptions {
            connect_timeout: Duration::from_secs(30),
            low_speed_time: Duration::from_secs(60),
            max_redirections: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CurlOptions {
    pub fn from_config(cfg: &DlmConfig) -> Self {
        CurlOptions {
            connect_timeout: cfg.connect_timeout(),
            user_agent: cfg
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            ..Default::default()
        }
    }
}

pub struct CurlEngine {
    staging_dir: PathBuf,
    options: CurlOptions,
    control: Arc<TransferControl>,
    runtime: Handle,
}

impl CurlEngine {
    /// Engine staging into `staging_dir`, running on the current tokio runtime.
    pub fn new(staging_dir: impl Into<PathBuf>, options: CurlOptions) -> Result<Self> {
        let runtime = Handle::try_current().context("CurlEngine needs a tokio runtime")?;
        Ok(Self::with_runtime(staging_dir, options, runtime))
    }

    pub fn with_runtime(staging_dir: impl Into<PathBuf>, options: CurlOptions, runtime: Handle) -> Self {
        CurlEngine {
            staging_dir: staging_dir.into(),
            options,
            control: Arc::new(TransferControl::new()),
            runtime,
        }
    }

    pub fn from_config(cfg: &DlmConfig) -> Result<Self> {
        Self::new(cfg.effective_staging_dir(), CurlOptions::from_config(cfg))
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Transfers currently running on the blocking pool.
    pub fn active_transfers(&self) -> usize {
        self.control.len()
    }
}

impl TransferEngine for CurlEngine {
    fn begin(&self, id: TransferId, source: TransferSource, sink: TransferSink) {
        let job = TransferJob {
            id,
            source,
            staging_dir: self.staging_dir.clone(),
            options: self.options.clone(),
            flag: self.control.register(id),
        };
        let control = Arc::clone(&self.control);
        self.runtime.spawn_blocking(move || {
            let outcome = transfer::run(&job, &sink);
            control.unregister(job.id);
            if let Outcome::Suspended(Some(_)) = &outcome {
                tracing::debug!(transfer = %job.id, "suspended with resumable partial");
            }
            outcome.deliver(&sink);
        });
    }

    fn suspend(&self, id: TransferId) {
        if !self.control.request(id, ControlSignal::Suspend) {
            tracing::debug!(transfer = %id, "suspend: transfer not started, holding request");
        }
    }

    fn abort(&self, id: TransferId) {
        if !self.control.request(id, ControlSignal::Abort) {
            tracing::debug!(transfer = %id, "abort: transfer not started, holding request");
        }
    }

    fn discard_token(&self, token: ResumeToken) {
        match ResumeData::decode(&token) {
            Ok(data) => data.discard(),
            Err(e) => tracing::debug!("discard_token: unreadable token: {}", e),
        }
    }
}
