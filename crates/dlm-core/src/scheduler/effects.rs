//! Work decided under the registry lock and carried out after it is released.
//!
//! Engine calls, placement, hashing and user callbacks all happen here, so
//! an engine that reports synchronously from `begin` and a callback that
//! calls back into the scheduler are both safe. Within one batch, engine work
//! runs before any user callback: a callback may address a task that the same
//! batch just dispatched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::delivery::DeliveryGate;
use super::task::{CompletionCallback, ProgressCallback, Task};
use super::Shared;
use crate::checksum;
use crate::engine::{Artifact, ResumeToken, TransferId, TransferSource};
use crate::error::DownloadError;
use crate::options::DownloadOptions;
use crate::url_model::resolve_filename;

pub(crate) enum Effect {
    Begin {
        target: Arc<str>,
        transfer: TransferId,
        source: TransferSource,
    },
    Suspend(TransferId),
    Abort(TransferId),
    DiscardToken(ResumeToken),
    DiscardArtifact(Artifact),
    Progress {
        callback: ProgressCallback,
        delivery: Arc<DeliveryGate>,
        fraction: f64,
    },
    Complete {
        target: Arc<str>,
        callback: Option<CompletionCallback>,
        /// `None` for a `start` rejected before any task existed.
        delivery: Option<Arc<DeliveryGate>>,
        result: Result<PathBuf, DownloadError>,
    },
    Place {
        target: Arc<str>,
        artifact: Artifact,
        options: DownloadOptions,
        callback: Option<CompletionCallback>,
        delivery: Arc<DeliveryGate>,
    },
    Verify {
        target: Arc<str>,
        transfer: TransferId,
        artifact: Artifact,
        expected: String,
    },
    RetryAfter {
        target: Arc<str>,
        transfer: TransferId,
        delay: Duration,
    },
}

impl Effect {
    /// Takes the task's completion callback; a task completes at most once.
    pub fn complete(task: &mut Task, result: Result<PathBuf, DownloadError>) -> Effect {
        Effect::Complete {
            target: Arc::clone(&task.target),
            callback: task.on_completion.take(),
            delivery: Some(Arc::clone(&task.delivery)),
            result,
        }
    }

    pub fn place(mut task: Task, artifact: Artifact) -> Effect {
        Effect::Place {
            callback: task.on_completion.take(),
            delivery: task.delivery,
            target: task.target,
            artifact,
            options: task.options,
        }
    }

    /// Calls into user code, as opposed to work for the engine, disk or timers.
    fn is_callback(&self) -> bool {
        matches!(
            self,
            Effect::Progress { .. } | Effect::Complete { .. } | Effect::Place { .. }
        )
    }
}

impl Shared {
    pub(super) fn apply(&self, effects: Vec<Effect>) {
        let (callbacks, work): (Vec<_>, Vec<_>) = effects.into_iter().partition(Effect::is_callback);
        for effect in work.into_iter().chain(callbacks) {
            self.run(effect);
        }
    }

    fn run(&self, effect: Effect) {
        match effect {
            Effect::Begin {
                target,
                transfer,
                source,
            } => {
                let sink = self.sink(target, transfer);
                self.engine.begin(transfer, source, sink);
            }
            Effect::Suspend(transfer) => self.engine.suspend(transfer),
            Effect::Abort(transfer) => self.engine.abort(transfer),
            Effect::DiscardToken(token) => self.engine.discard_token(token),
            Effect::DiscardArtifact(artifact) => artifact.discard(),
            Effect::Progress {
                callback,
                delivery,
                fraction,
            } => {
                delivery.progress(|| callback(fraction));
            }
            Effect::Complete {
                target,
                callback,
                delivery,
                result,
            } => {
                if let Some(delivery) = delivery {
                    delivery.close();
                }
                log_completion(&target, &result);
                if let Some(callback) = callback {
                    callback(result);
                }
            }
            Effect::Place {
                target,
                artifact,
                options,
                callback,
                delivery,
            } => {
                let result = self.place(&target, &artifact, &options);
                delivery.close();
                log_completion(&target, &result);
                if let Some(callback) = callback {
                    callback(result);
                }
            }
            Effect::Verify {
                target,
                transfer,
                artifact,
                expected,
            } => {
                let me = self.me.clone();
                self.runtime.spawn_blocking(move || {
                    let outcome = checksum::verify_sha256(&artifact.path, &expected);
                    match me.upgrade() {
                        Some(shared) => shared.on_verified(&target, transfer, artifact, outcome),
                        None => artifact.discard(),
                    }
                });
            }
            Effect::RetryAfter {
                target,
                transfer,
                delay,
            } => {
                let me = self.me.clone();
                self.runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(shared) = me.upgrade() {
                        shared.on_backoff_elapsed(&target, transfer);
                    }
                });
            }
        }
    }

    fn place(&self, target: &str, artifact: &Artifact, options: &DownloadOptions) -> Result<PathBuf, DownloadError> {
        let filename = resolve_filename(
            options.filename.as_deref(),
            artifact.suggested_filename.as_deref(),
            target,
        );
        self.placer
            .place(&artifact.path, &options.destination_directory, &filename, options.overwrite)
            .map_err(|e| {
                artifact.discard();
                DownloadError::from(e)
            })
    }
}

fn log_completion(target: &str, result: &Result<PathBuf, DownloadError>) {
    match result {
        Ok(path) => tracing::info!(url = %target, "saved to {}", path.display()),
        Err(DownloadError::Cancelled) => tracing::debug!(url = %target, "cancelled"),
        Err(e) => tracing::warn!(url = %target, "download failed: {}", e),
    }
}
