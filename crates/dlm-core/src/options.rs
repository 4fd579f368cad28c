//! Per-download options.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Retry budget used when the caller does not set one.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// How one download should be performed and where its file should end up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// Created if missing.
    pub destination_directory: PathBuf,
    /// Final filename; derived from the response or URL when `None`.
    pub filename: Option<String>,
    /// Replace an existing file instead of picking `name (1).ext`.
    pub overwrite: bool,
    /// Extra request headers.
    pub headers: HashMap<String, String>,
    /// Whole-request timeout per attempt.
    pub timeout_secs: Option<u64>,
    /// Retries after the first attempt; must be >= 0.
    pub max_retries: i32,
    /// Lowercase or uppercase hex SHA-256 the downloaded bytes must match.
    pub expected_sha256: Option<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            destination_directory: PathBuf::from("."),
            filename: None,
            overwrite: false,
            headers: HashMap::new(),
            timeout_secs: None,
            max_retries: DEFAULT_MAX_RETRIES,
            expected_sha256: None,
        }
    }
}

impl DownloadOptions {
    pub fn new(destination_directory: impl Into<PathBuf>) -> Self {
        DownloadOptions {
            destination_directory: destination_directory.into(),
            ..Default::default()
        }
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, retries: i32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn expected_sha256(mut self, digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(digest.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|&s| s > 0).map(Duration::from_secs)
    }
}
