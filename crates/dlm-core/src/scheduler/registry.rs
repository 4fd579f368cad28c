//! Registry of live tasks plus the FIFO admission queue.
//!
//! Everything here runs under the scheduler lock and only records what must
//! happen afterwards as [`Effect`]s.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::effects::Effect;
use super::task::{Phase, Task};
use crate::engine::{ResumeToken, TransferId, TransferSource};
use crate::error::DownloadError;

pub(crate) struct Registry {
    tasks: HashMap<Arc<str>, Task>,
    queue: VecDeque<Arc<str>>,
    limit: usize,
    next_transfer: u64,
}

impl Registry {
    pub fn new(limit: usize) -> Self {
        Registry {
            tasks: HashMap::new(),
            queue: VecDeque::new(),
            limit: limit.max(1),
            next_transfer: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn contains(&self, target: &str) -> bool {
        self.tasks.contains_key(target)
    }

    pub fn get(&self, target: &str) -> Option<&Task> {
        self.tasks.get(target)
    }

    pub fn get_mut(&mut self, target: &str) -> Option<&mut Task> {
        self.tasks.get_mut(target)
    }

    pub fn running_count(&self) -> usize {
        self.tasks.values().filter(|t| t.phase.holds_slot()).count()
    }

    pub fn queued_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| matches!(t.phase, Phase::Queued { .. }))
            .count()
    }

    pub fn has_capacity(&self) -> bool {
        self.running_count() < self.limit
    }

    pub fn mint_transfer(&mut self) -> TransferId {
        self.next_transfer += 1;
        TransferId::new(self.next_transfer)
    }

    /// Phase of the task under `target`, if its current transfer is `transfer`.
    pub fn live_phase(&self, target: &str, transfer: TransferId) -> Option<&Phase> {
        self.tasks
            .get(target)
            .map(|t| &t.phase)
            .filter(|p| p.transfer() == Some(transfer))
    }

    /// Task registered under `target` whose current transfer is `transfer`.
    pub fn live_mut(&mut self, target: &str, transfer: TransferId) -> Option<&mut Task> {
        self.tasks
            .get_mut(target)
            .filter(|t| t.phase.transfer() == Some(transfer))
    }

    /// Registers a new task and either dispatches or queues it.
    pub fn insert(&mut self, task: Task, effects: &mut Vec<Effect>) {
        let target = Arc::clone(&task.target);
        self.tasks.insert(Arc::clone(&target), task);
        if self.has_capacity() {
            self.dispatch(&target, None, effects);
        } else {
            self.enqueue(&target, None);
        }
    }

    /// Starts a new transfer for a registered task.
    pub fn dispatch(&mut self, target: &Arc<str>, token: Option<ResumeToken>, effects: &mut Vec<Effect>) {
        let transfer = self.mint_transfer();
        let Some(task) = self.tasks.get_mut(target) else {
            return;
        };
        task.phase = Phase::Running { transfer };
        let request = task.request.clone();
        let source = match token {
            Some(token) => TransferSource::Resume { request, token },
            None => TransferSource::Fresh(request),
        };
        tracing::debug!(url = %target, transfer = %transfer, resume = source.resume_token().is_some(), "dispatch");
        effects.push(Effect::Begin {
            target: Arc::clone(target),
            transfer,
            source,
        });
    }

    pub fn enqueue(&mut self, target: &Arc<str>, token: Option<ResumeToken>) {
        if let Some(task) = self.tasks.get_mut(target) {
            task.phase = Phase::Queued { token };
            self.queue.retain(|t| t != target);
            self.queue.push_back(Arc::clone(target));
            tracing::debug!(url = %target, "queued");
        }
    }

    pub fn dequeue(&mut self, target: &str) {
        self.queue.retain(|t| &**t != target);
    }

    /// Paused task back to work: now if a slot is free, else at the back of the queue.
    pub fn resume_paused(&mut self, target: &Arc<str>, effects: &mut Vec<Effect>) {
        let token = match self.tasks.get_mut(target) {
            Some(task) => task.phase.take_token(),
            None => return,
        };
        if self.has_capacity() {
            self.dispatch(target, token, effects);
        } else {
            self.enqueue(target, token);
        }
    }

    /// Fills free slots from the front of the queue.
    pub fn admit(&mut self, effects: &mut Vec<Effect>) {
        while self.has_capacity() {
            let Some(target) = self.queue.pop_front() else {
                break;
            };
            let token = match self.tasks.get_mut(&target) {
                Some(task) if matches!(task.phase, Phase::Queued { .. }) => task.phase.take_token(),
                _ => continue,
            };
            self.dispatch(&target, token, effects);
        }
    }

    /// Unregisters `target`. The caller owns firing its completion.
    pub fn remove(&mut self, target: &str) -> Option<Task> {
        let task = self.tasks.remove(target)?;
        self.dequeue(target);
        Some(task)
    }

    /// Removes a task with `result` as its outcome and admits queued work.
    pub fn finish(&mut self, target: &str, result: Result<std::path::PathBuf, DownloadError>, effects: &mut Vec<Effect>) {
        if let Some(mut task) = self.remove(target) {
            effects.push(Effect::complete(&mut task, result));
        }
        self.admit(effects);
    }

    /// Removes every task, producing the effects that cancel them.
    pub fn drain_cancelled(&mut self, effects: &mut Vec<Effect>) {
        self.queue.clear();
        for (_, mut task) in self.tasks.drain() {
            cancel_effects(&mut task, effects);
        }
    }
}

/// Cancelled completion followed by releasing whatever the task still holds.
pub(crate) fn cancel_effects(task: &mut Task, effects: &mut Vec<Effect>) {
    effects.push(Effect::complete(task, Err(DownloadError::Cancelled)));
    match &mut task.phase {
        Phase::Running { transfer } | Phase::Suspending { transfer, .. } => {
            effects.push(Effect::Abort(*transfer));
        }
        Phase::Queued { token } | Phase::Paused { token } => {
            if let Some(token) = token.take() {
                effects.push(Effect::DiscardToken(token));
            }
        }
        Phase::Backoff { .. } | Phase::Finishing { .. } => {}
    }
}
