//! Engine events, retry timers and checksum results arriving at the scheduler.
//!
//! Every handler first checks that the task is still registered and that the
//! event belongs to its current transfer. Anything else is stale: a cancelled
//! task, a superseded attempt, a transfer that was already paused.

use std::io;
use std::sync::Arc;

use super::effects::Effect;
use super::registry::Registry;
use super::task::Phase;
use super::Shared;
use crate::checksum::Verification;
use crate::engine::{
    Artifact, EventSink, ResumeToken, TransferError, TransferErrorKind, TransferId, TransferSource,
};
use crate::error::DownloadError;
use crate::retry::RetryDecision;

impl EventSink for Shared {
    fn on_progress(&self, target: &Arc<str>, transfer: TransferId, written: u64, expected: u64) {
        let effect = {
            let mut reg = self.lock();
            let Some(task) = reg.live_mut(target, transfer) else {
                return;
            };
            if !matches!(task.phase, Phase::Running { .. }) {
                return;
            }
            let Some(fraction) = task.accept_progress(written, expected) else {
                return;
            };
            Effect::Progress {
                callback: Arc::clone(&task.on_progress),
                delivery: Arc::clone(&task.delivery),
                fraction,
            }
        };
        self.apply(vec![effect]);
    }

    fn on_succeeded(&self, target: &Arc<str>, transfer: TransferId, artifact: Artifact) {
        let mut effects = Vec::new();
        {
            let mut reg = self.lock();
            // a success that races a suspend request still counts
            let expected = match reg.live_phase(target, transfer) {
                Some(Phase::Running { .. } | Phase::Suspending { .. }) => reg
                    .get(target)
                    .map(|t| t.options.expected_sha256.clone()),
                _ => None,
            };
            match expected {
                None => {
                    tracing::debug!(url = %target, transfer = %transfer, "stale success, discarding artifact");
                    effects.push(Effect::DiscardArtifact(artifact));
                }
                Some(Some(expected)) => {
                    if let Some(task) = reg.get_mut(target) {
                        task.phase = Phase::Finishing { transfer };
                    }
                    tracing::debug!(url = %target, transfer = %transfer, "verifying checksum");
                    effects.push(Effect::Verify {
                        target: Arc::clone(target),
                        transfer,
                        artifact,
                        expected,
                    });
                }
                Some(None) => succeed(&mut reg, target, artifact, &mut effects),
            }
        }
        self.apply(effects);
    }

    fn on_failed(&self, target: &Arc<str>, transfer: TransferId, error: TransferError) {
        let mut effects = Vec::new();
        {
            let mut reg = self.lock();
            match reg.live_phase(target, transfer) {
                Some(Phase::Suspending { resume_pending, .. }) => {
                    let resume_pending = *resume_pending;
                    tracing::debug!(url = %target, "failed while suspending ({}), pausing without token", error);
                    complete_suspend(&mut reg, target, None, resume_pending, &mut effects);
                }
                Some(Phase::Running { .. }) if error.kind == TransferErrorKind::Aborted => {
                    reg.finish(target, Err(DownloadError::Cancelled), &mut effects);
                }
                Some(Phase::Running { .. }) => self.fail(&mut reg, target, error, &mut effects),
                _ => tracing::debug!(url = %target, transfer = %transfer, "stale failure ignored: {}", error),
            }
        }
        self.apply(effects);
    }

    fn on_suspended(&self, target: &Arc<str>, transfer: TransferId, token: Option<ResumeToken>) {
        let mut effects = Vec::new();
        {
            let mut reg = self.lock();
            let resume_pending = match reg.live_phase(target, transfer) {
                Some(Phase::Suspending { resume_pending, .. }) => Some(*resume_pending),
                Some(Phase::Running { .. }) => Some(false),
                _ => None,
            };
            match resume_pending {
                Some(resume_pending) => {
                    complete_suspend(&mut reg, target, token, resume_pending, &mut effects)
                }
                None => {
                    tracing::debug!(url = %target, transfer = %transfer, "stale suspension");
                    if let Some(token) = token {
                        effects.push(Effect::DiscardToken(token));
                    }
                }
            }
        }
        self.apply(effects);
    }
}

impl Shared {
    /// Retry delay is over: dispatch the attempt `transfer` was minted for.
    pub(super) fn on_backoff_elapsed(&self, target: &Arc<str>, transfer: TransferId) {
        let mut effects = Vec::new();
        {
            let mut reg = self.lock();
            let Some(task) = reg.live_mut(target, transfer) else {
                return;
            };
            if !matches!(task.phase, Phase::Backoff { .. }) {
                return;
            }
            task.phase = Phase::Running { transfer };
            tracing::debug!(url = %target, transfer = %transfer, attempt = task.retry_count, "retrying");
            effects.push(Effect::Begin {
                target: Arc::clone(target),
                transfer,
                source: TransferSource::Fresh(task.request.clone()),
            });
        }
        self.apply(effects);
    }

    pub(super) fn on_verified(
        &self,
        target: &Arc<str>,
        transfer: TransferId,
        artifact: Artifact,
        outcome: io::Result<Verification>,
    ) {
        let mut effects = Vec::new();
        {
            let mut reg = self.lock();
            if !matches!(reg.live_phase(target, transfer), Some(Phase::Finishing { .. })) {
                effects.push(Effect::DiscardArtifact(artifact));
            } else {
                match outcome {
                    Ok(Verification::Match) => succeed(&mut reg, target, artifact, &mut effects),
                    Ok(Verification::Mismatch { actual }) => {
                        effects.push(Effect::DiscardArtifact(artifact));
                        let error = TransferError::integrity(format!("sha256 mismatch (got {})", actual));
                        self.fail(&mut reg, target, error, &mut effects);
                    }
                    Err(e) => {
                        effects.push(Effect::DiscardArtifact(artifact));
                        self.fail(&mut reg, target, TransferError::io(&e), &mut effects);
                    }
                }
            }
        }
        self.apply(effects);
    }

    /// Transport failure of the current attempt: back off and retry, or give up.
    fn fail(&self, reg: &mut Registry, target: &Arc<str>, error: TransferError, effects: &mut Vec<Effect>) {
        let next = reg.mint_transfer();
        let Some(task) = reg.get_mut(target) else {
            return;
        };
        match self.retry.decide(task.retry_count, task.max_retries) {
            RetryDecision::RetryAfter(delay) => {
                task.retry_count += 1;
                task.phase = Phase::Backoff { transfer: next };
                tracing::warn!(
                    url = %target,
                    attempt = task.retry_count,
                    max_retries = task.max_retries,
                    "transfer failed ({}), retrying in {:?}",
                    error,
                    delay
                );
                effects.push(Effect::RetryAfter {
                    target: Arc::clone(target),
                    transfer: next,
                    delay,
                });
            }
            RetryDecision::NoRetry => {
                tracing::debug!(url = %target, retries = task.retry_count, "retry budget exhausted");
                reg.finish(target, Err(error.into()), effects);
            }
        }
    }
}

/// Unregisters a task whose transfer is complete and hands the artifact to placement.
fn succeed(reg: &mut Registry, target: &str, artifact: Artifact, effects: &mut Vec<Effect>) {
    let Some(task) = reg.remove(target) else {
        effects.push(Effect::DiscardArtifact(artifact));
        return;
    };
    reg.admit(effects);
    effects.push(Effect::place(task, artifact));
}

/// Suspension acknowledged: the task is paused, its slot is free.
fn complete_suspend(
    reg: &mut Registry,
    target: &Arc<str>,
    token: Option<ResumeToken>,
    resume_pending: bool,
    effects: &mut Vec<Effect>,
) {
    if let Some(task) = reg.get_mut(target) {
        task.phase = Phase::Paused { token };
    }
    tracing::debug!(url = %target, "paused");
    if resume_pending {
        reg.resume_paused(target, effects);
    }
    reg.admit(effects);
}
