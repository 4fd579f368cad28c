use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry delay parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry in seconds (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum delay between retries in seconds.
    pub max_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 0.25,
            max_delay_secs: 5.0,
        }
    }
}

/// Global configuration loaded from `~/.config/dlm/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlmConfig {
    /// Maximum number of downloads transferring at the same time.
    pub max_concurrent_downloads: usize,
    /// Default retry budget per download when the caller does not set one.
    pub max_retries: u32,
    /// Connect timeout for each transfer, in seconds.
    pub connect_timeout_secs: u64,
    /// Optional retry delay tuning; built-in defaults when missing.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Default destination directory (None = current directory).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Where in-flight transfers are staged (None = system temp dir).
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// User-Agent header sent with every transfer.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for DlmConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            max_retries: 3,
            connect_timeout_secs: 30,
            retry: None,
            download_dir: None,
            staging_dir: None,
            user_agent: None,
        }
    }
}

impl DlmConfig {
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// Staging directory for partial transfers.
    pub fn effective_staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("dlm"))
    }

    /// The config as it would be written to `config.toml`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize config")
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DlmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DlmConfig::default();
        let toml = default_cfg.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<DlmConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: DlmConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
