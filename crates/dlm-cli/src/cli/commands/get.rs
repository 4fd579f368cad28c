//! `dlm get` – download URLs through the scheduler until all are settled.

use anyhow::{bail, Context, Result};
use dlm_core::{DlmConfig, DownloadError, DownloadOptions, Scheduler};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::cli::control;

/// Minimum time between two progress lines for the same URL.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Arguments of `dlm get`, after clap parsing.
#[derive(Debug, Default)]
pub struct GetArgs {
    pub urls: Vec<String>,
    pub dir: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub output: Option<String>,
    pub overwrite: bool,
    pub headers: Vec<String>,
    pub timeout: Option<u64>,
    pub retries: Option<i32>,
    pub sha256: Option<String>,
    pub interactive: bool,
}

enum Event {
    Progress { url: String, fraction: f64 },
    Done { url: String, result: Result<PathBuf, DownloadError> },
}

/// Split `Name: value` into a header pair.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header `{}` is not `Name: value`", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header `{}` has an empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Options shared by every URL of one `dlm get` invocation.
pub(crate) fn build_options(cfg: &DlmConfig, args: &GetArgs) -> Result<DownloadOptions> {
    if args.urls.len() != 1 && (args.output.is_some() || args.sha256.is_some()) {
        bail!("--output and --sha256 need exactly one URL");
    }
    let dir = match args.dir.clone().or_else(|| cfg.download_dir.clone()) {
        Some(d) => d,
        None => std::env::current_dir().context("current directory")?,
    };
    let retries = match args.retries {
        Some(n) => n,
        None => i32::try_from(cfg.max_retries).unwrap_or(i32::MAX),
    };

    let mut options = DownloadOptions::new(dir)
        .overwrite(args.overwrite)
        .max_retries(retries);
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        options = options.header(name, value);
    }
    if let Some(secs) = args.timeout {
        options = options.timeout_secs(secs);
    }
    if let Some(name) = &args.output {
        options = options.filename(name.clone());
    }
    if let Some(digest) = &args.sha256 {
        options = options.expected_sha256(digest.clone());
    }
    Ok(options)
}

/// Start every URL, print progress to stderr and final paths to stdout.
/// Fails if any download did not succeed.
pub async fn run_get(cfg: &DlmConfig, args: GetArgs) -> Result<()> {
    let options = build_options(cfg, &args)?;
    let scheduler = Scheduler::from_config(cfg)?;
    if let Some(jobs) = args.jobs {
        scheduler.set_concurrency_limit(jobs);
    }
    tracing::info!(
        count = args.urls.len(),
        limit = scheduler.concurrency_limit(),
        dir = %options.destination_directory.display(),
        "starting downloads"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    for url in &args.urls {
        let progress_tx = tx.clone();
        let done_tx = tx.clone();
        let progress_url = url.clone();
        let done_url = url.clone();
        scheduler.start(
            url,
            options.clone(),
            move |fraction| {
                let _ = progress_tx.send(Event::Progress {
                    url: progress_url.clone(),
                    fraction,
                });
            },
            move |result| {
                let _ = done_tx.send(Event::Done { url: done_url, result });
            },
        );
    }
    drop(tx);

    let interrupt = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupted, cancelling downloads");
                scheduler.cancel_all();
            }
        })
    };
    if args.interactive {
        control::spawn_stdin_control(scheduler.clone()).context("start stdin control")?;
        eprintln!("commands: pause <url> | resume <url> | cancel <url> | limit <n> | status");
    }

    let total = args.urls.len();
    let mut remaining = total;
    let mut failed = 0usize;
    let mut last_print: HashMap<String, Instant> = HashMap::new();
    while remaining > 0 {
        let Some(event) = rx.recv().await else {
            break;
        };
        match event {
            Event::Progress { url, fraction } => {
                let now = Instant::now();
                let due = last_print
                    .get(&url)
                    .map_or(true, |t| now.duration_since(*t) >= PROGRESS_INTERVAL);
                if due || fraction >= 1.0 {
                    last_print.insert(url.clone(), now);
                    eprintln!("{:>5.1}%  {}", fraction * 100.0, url);
                }
            }
            Event::Done { url, result } => {
                remaining -= 1;
                match result {
                    Ok(path) => println!("{}", path.display()),
                    Err(e) => {
                        failed += 1;
                        eprintln!("failed: {}: {}", url, e);
                    }
                }
            }
        }
    }
    interrupt.abort();

    if failed > 0 {
        bail!("{} of {} downloads failed", failed, total);
    }
    Ok(())
}
