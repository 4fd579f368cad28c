//! CLI for the dlm download manager.

mod commands;
mod control;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dlm_core::config;
use std::path::{Path, PathBuf};

use commands::{run_checksum, run_completions, run_config, run_get, GetArgs};

/// Top-level CLI for the dlm download manager.
#[derive(Debug, Parser)]
#[command(name = "dlm")]
#[command(about = "dlm: concurrent download manager with pause, resume and retry", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more URLs concurrently.
    Get {
        /// Direct HTTP/HTTPS URLs.
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Destination directory (default: config `download_dir`, else the current directory).
        #[arg(short = 'd', long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Maximum downloads transferring at once (default: config `max_concurrent_downloads`).
        #[arg(short = 'j', long, value_name = "N")]
        jobs: Option<usize>,

        /// Final filename (single URL only).
        #[arg(short = 'o', long, value_name = "NAME")]
        output: Option<String>,

        /// Replace existing files instead of saving as `name (1).ext`.
        #[arg(long)]
        overwrite: bool,

        /// Extra request header, e.g. -H 'Authorization: Bearer xyz'. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "K: V")]
        headers: Vec<String>,

        /// Per-attempt request timeout in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Retries after the first attempt (default: config `max_retries`).
        #[arg(long, value_name = "N")]
        retries: Option<i32>,

        /// Expected SHA-256 of the downloaded file (single URL only).
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,

        /// Read `pause|resume|cancel <url>` and `limit <n>` commands from stdin.
        #[arg(long)]
        interactive: bool,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: String,
    },

    /// Show the effective configuration and where it lives.
    Config,

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Get {
                urls,
                dir,
                jobs,
                output,
                overwrite,
                headers,
                timeout,
                retries,
                sha256,
                interactive,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let args = GetArgs {
                    urls,
                    dir,
                    jobs,
                    output,
                    overwrite,
                    headers,
                    timeout,
                    retries,
                    sha256,
                    interactive,
                };
                run_get(&cfg, args).await?;
            }
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
            CliCommand::Config => run_config()?,
            CliCommand::Completions { shell } => run_completions(shell),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
