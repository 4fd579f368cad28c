//! `dlm config` – show the effective configuration.

use anyhow::Result;
use dlm_core::config;

pub fn run_config() -> Result<()> {
    let path = config::config_path()?;
    let cfg = config::load_or_init()?;
    println!("# {}", path.display());
    print!("{}", cfg.to_toml()?);
    println!("# staging dir: {}", cfg.effective_staging_dir().display());
    Ok(())
}
