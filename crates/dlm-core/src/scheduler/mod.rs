//! Download registry and scheduler.
//!
//! The [`Scheduler`] owns every live download, keyed by target URL: at most
//! one task per target, at most `concurrency_limit` tasks holding a transfer
//! slot, FIFO admission for the rest. Callers start, pause, resume and cancel
//! by target; the engine reports back through per-dispatch sinks.
//!
//! All state sits behind one mutex. Operations and engine events decide what
//! to do while holding it and perform the outcome (engine calls, placement,
//! user callbacks) after releasing it.

mod delivery;
mod effects;
mod events;
mod handle;
mod registry;
mod task;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use crate::checksum::normalize_sha256;
use crate::config::DlmConfig;
use crate::engine::{CurlEngine, EventSink, TransferEngine, TransferId, TransferSink};
use crate::error::DownloadError;
use crate::options::DownloadOptions;
use crate::retry::RetryPolicy;
use crate::storage::{FsPlacer, StoragePlacer};
use crate::url_model::validate_target;
use effects::Effect;
use registry::{cancel_effects, Registry};
use task::{Phase, Task};

pub use handle::DownloadHandle;
pub use task::TaskState;

/// Concurrency limit when none is configured.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;

/// Scheduler tuning, usually derived from [`DlmConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub concurrency_limit: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl From<&DlmConfig> for SchedulerConfig {
    fn from(cfg: &DlmConfig) -> Self {
        SchedulerConfig {
            concurrency_limit: cfg.max_concurrent_downloads.max(1),
            retry_policy: RetryPolicy::from_config(&cfg.retry_config()),
        }
    }
}

pub(crate) struct Shared {
    registry: Mutex<Registry>,
    engine: Arc<dyn TransferEngine>,
    placer: Arc<dyn StoragePlacer>,
    retry: RetryPolicy,
    runtime: Handle,
    me: Weak<Shared>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self, target: Arc<str>, transfer: TransferId) -> TransferSink {
        let events: Weak<dyn EventSink> = self.me.clone();
        TransferSink::new(events, target, transfer)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let mut effects = Vec::new();
        self.registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain_cancelled(&mut effects);
        if !effects.is_empty() {
            tracing::debug!("scheduler dropped with live downloads, cancelling them");
        }
        self.apply(effects);
    }
}

/// Builds a [`Scheduler`] around an engine and a placer.
pub struct SchedulerBuilder {
    engine: Arc<dyn TransferEngine>,
    placer: Arc<dyn StoragePlacer>,
    config: SchedulerConfig,
    runtime: Option<Handle>,
}

impl SchedulerBuilder {
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = limit;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Runtime for retry timers and checksum jobs; defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().context("Scheduler needs a tokio runtime")?,
        };
        if self.config.concurrency_limit == 0 {
            tracing::warn!("concurrency limit 0 clamped to 1");
        }
        let shared = Arc::new_cyclic(|me| Shared {
            registry: Mutex::new(Registry::new(self.config.concurrency_limit)),
            engine: self.engine,
            placer: self.placer,
            retry: self.config.retry_policy,
            runtime,
            me: me.clone(),
        });
        Ok(Scheduler { shared })
    }
}

/// Handle to the download registry. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn builder(engine: Arc<dyn TransferEngine>, placer: Arc<dyn StoragePlacer>) -> SchedulerBuilder {
        SchedulerBuilder {
            engine,
            placer,
            config: SchedulerConfig::default(),
            runtime: None,
        }
    }

    /// Production scheduler: libcurl engine, filesystem placer, settings from `cfg`.
    pub fn from_config(cfg: &DlmConfig) -> Result<Scheduler> {
        let engine = CurlEngine::from_config(cfg)?;
        Scheduler::builder(Arc::new(engine), Arc::new(FsPlacer::new()))
            .config(SchedulerConfig::from(cfg))
            .build()
    }

    /// Registers a download of `target`.
    ///
    /// `on_completion` fires exactly once: synchronously (before this
    /// returns) when the request is rejected, otherwise when the download
    /// succeeds, fails for good, or is cancelled. `on_progress` receives
    /// fractions in `[0, 1]` that never decrease.
    pub fn start<P, C>(&self, target: &str, options: DownloadOptions, on_progress: P, on_completion: C)
    where
        P: Fn(f64) + Send + Sync + 'static,
        C: FnOnce(Result<PathBuf, DownloadError>) + Send + 'static,
    {
        let key: Arc<str> = Arc::from(target);
        let on_completion: task::CompletionCallback = Box::new(on_completion);

        let rejected = |error: DownloadError, on_completion: task::CompletionCallback| {
            self.shared.apply(vec![Effect::Complete {
                target: Arc::clone(&key),
                callback: Some(on_completion),
                delivery: None,
                result: Err(error),
            }]);
        };

        if let Err(problem) = validate_target(target) {
            return rejected(
                DownloadError::InvalidInput {
                    target: target.to_string(),
                    reason: problem.to_string(),
                },
                on_completion,
            );
        }
        let max_retries = match u32::try_from(options.max_retries) {
            Ok(n) => n,
            Err(_) => return rejected(DownloadError::InvalidRetryCount(options.max_retries), on_completion),
        };
        let mut options = options;
        if let Some(digest) = options.expected_sha256.take() {
            match normalize_sha256(&digest) {
                Some(normalized) => options.expected_sha256 = Some(normalized),
                None => {
                    return rejected(
                        DownloadError::InvalidInput {
                            target: target.to_string(),
                            reason: format!("`{}` is not a SHA-256 hex digest", digest),
                        },
                        on_completion,
                    )
                }
            }
        }

        let mut effects = Vec::new();
        {
            let mut reg = self.shared.lock();
            if reg.contains(target) {
                drop(reg);
                return rejected(DownloadError::DuplicateDownload(target.to_string()), on_completion);
            }
            let task = Task::new(Arc::clone(&key), options, max_retries, Arc::new(on_progress), on_completion);
            reg.insert(task, &mut effects);
        }
        self.shared.apply(effects);
    }

    /// [`start`](Self::start) with the callbacks wired into a [`DownloadHandle`].
    pub fn download(&self, target: &str, options: DownloadOptions) -> DownloadHandle {
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let (result_tx, result_rx) = oneshot::channel();
        self.start(
            target,
            options,
            move |fraction| {
                progress_tx.send_replace(fraction);
            },
            move |result| {
                let _ = result_tx.send(result);
            },
        );
        DownloadHandle::new(target.to_string(), progress_rx, result_rx)
    }

    /// Asks a running download to suspend, or parks a queued one.
    ///
    /// A running task keeps its slot until the engine acknowledges; it is
    /// then paused (with a resume token when the engine produced one).
    pub fn pause(&self, target: &str) {
        let mut effects = Vec::new();
        {
            let mut reg = self.shared.lock();
            let Some(task) = reg.get_mut(target) else {
                return;
            };
            match task.phase {
                Phase::Running { transfer } => {
                    task.phase = Phase::Suspending {
                        transfer,
                        resume_pending: false,
                    };
                    tracing::debug!(url = %target, transfer = %transfer, "suspending");
                    effects.push(Effect::Suspend(transfer));
                }
                Phase::Backoff { .. } => {
                    task.phase = Phase::Paused { token: None };
                    tracing::debug!(url = %target, "paused during retry delay");
                    reg.admit(&mut effects);
                }
                Phase::Queued { .. } => {
                    let token = task.phase.take_token();
                    task.phase = Phase::Paused { token };
                    reg.dequeue(target);
                    tracing::debug!(url = %target, "paused while queued");
                }
                Phase::Suspending { .. } | Phase::Finishing { .. } | Phase::Paused { .. } => {}
            }
        }
        self.shared.apply(effects);
    }

    /// Continues a paused download, from its resume token when it has one.
    ///
    /// Resuming while a pause is still being acknowledged takes effect right
    /// after the acknowledgement.
    pub fn resume(&self, target: &str) {
        let mut effects = Vec::new();
        {
            let mut reg = self.shared.lock();
            let Some(task) = reg.get_mut(target) else {
                return;
            };
            if let Phase::Suspending { resume_pending, .. } = &mut task.phase {
                *resume_pending = true;
            } else if matches!(task.phase, Phase::Paused { .. }) {
                let key = Arc::clone(&task.target);
                reg.resume_paused(&key, &mut effects);
            }
        }
        self.shared.apply(effects);
    }

    /// Removes `target` and reports it cancelled. No-op if not registered.
    pub fn cancel(&self, target: &str) {
        let mut effects = Vec::new();
        {
            let mut reg = self.shared.lock();
            let Some(mut task) = reg.remove(target) else {
                return;
            };
            cancel_effects(&mut task, &mut effects);
            reg.admit(&mut effects);
        }
        self.shared.apply(effects);
    }

    pub fn cancel_all(&self) {
        let mut effects = Vec::new();
        self.shared.lock().drain_cancelled(&mut effects);
        self.shared.apply(effects);
    }

    /// Whether `target` is registered (queued, running or paused).
    pub fn is_active(&self, target: &str) -> bool {
        self.shared.lock().contains(target)
    }

    pub fn state(&self, target: &str) -> Option<TaskState> {
        self.shared.lock().get(target).map(|t| t.phase.state())
    }

    /// Changes the number of transfer slots. Running tasks are never
    /// preempted; extra slots are filled on the next completion.
    pub fn set_concurrency_limit(&self, limit: usize) {
        if limit == 0 {
            tracing::warn!("concurrency limit 0 clamped to 1");
        }
        self.shared.lock().set_limit(limit);
    }

    pub fn concurrency_limit(&self) -> usize {
        self.shared.lock().limit()
    }

    pub fn running_count(&self) -> usize {
        self.shared.lock().running_count()
    }

    pub fn queued_count(&self) -> usize {
        self.shared.lock().queued_count()
    }

    /// Number of registered downloads.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reg = self.shared.lock();
        f.debug_struct("Scheduler")
            .field("registered", &reg.len())
            .field("running", &reg.running_count())
            .field("limit", &reg.limit())
            .finish()
    }
}
