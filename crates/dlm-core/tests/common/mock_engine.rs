//! Scriptable transfer engine for scheduler tests.
//!
//! `begin` only records the dispatch; tests then drive the transfer through
//! the recorded sink (progress, success, failure, suspension) whenever they
//! choose. The engine lock is never held while calling into a sink.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dlm_core::engine::{
    Artifact, ResumeToken, TransferEngine, TransferError, TransferId, TransferRequest, TransferSink,
    TransferSource,
};

#[derive(Debug, Clone)]
pub struct Begun {
    pub id: TransferId,
    pub target: String,
    pub request: TransferRequest,
    pub token: Option<ResumeToken>,
    pub sink: TransferSink,
}

#[derive(Default)]
struct Recorded {
    begun: Vec<Begun>,
    suspends: Vec<TransferId>,
    aborts: Vec<TransferId>,
    discarded: Vec<ResumeToken>,
    /// Suspend/abort requests that arrived before `begin` for their id.
    early: Vec<TransferId>,
}

impl Recorded {
    fn control(&mut self, id: TransferId) {
        if !self.begun.iter().any(|b| b.id == id) {
            self.early.push(id);
        }
    }
}

#[derive(Default)]
pub struct MockEngine {
    recorded: Mutex<Recorded>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begun(&self) -> Vec<Begun> {
        self.recorded.lock().unwrap().begun.clone()
    }

    pub fn begin_count(&self) -> usize {
        self.recorded.lock().unwrap().begun.len()
    }

    pub fn begin_count_for(&self, target: &str) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .begun
            .iter()
            .filter(|b| b.target == target)
            .count()
    }

    /// Most recent dispatch of `target`.
    pub fn latest(&self, target: &str) -> Begun {
        self.recorded
            .lock()
            .unwrap()
            .begun
            .iter()
            .rev()
            .find(|b| b.target == target)
            .cloned()
            .unwrap_or_else(|| panic!("{} was never dispatched", target))
    }

    pub fn suspends(&self) -> Vec<TransferId> {
        self.recorded.lock().unwrap().suspends.clone()
    }

    pub fn aborts(&self) -> Vec<TransferId> {
        self.recorded.lock().unwrap().aborts.clone()
    }

    pub fn discarded(&self) -> Vec<ResumeToken> {
        self.recorded.lock().unwrap().discarded.clone()
    }

    pub fn early_requests(&self) -> Vec<TransferId> {
        self.recorded.lock().unwrap().early.clone()
    }

    /// Waits until `target` has been dispatched `n` times.
    pub async fn wait_for_begins(&self, target: &str, n: usize) -> Begun {
        let ok = super::eventually(Duration::from_secs(5), || self.begin_count_for(target) >= n).await;
        assert!(ok, "{} not dispatched {} times (got {})", target, n, self.begin_count_for(target));
        self.latest(target)
    }

    pub fn progress(&self, target: &str, written: u64, expected: u64) {
        self.latest(target).sink.progress(written, expected);
    }

    /// Writes `body` to a fresh artifact in `staging` and reports success.
    pub fn succeed(&self, target: &str, staging: &Path, body: &[u8]) -> PathBuf {
        let begun = self.latest(target);
        let path = staging.join(format!(".artifact-{}", begun.id.get()));
        std::fs::write(&path, body).unwrap();
        begun.sink.succeeded(Artifact::new(&path));
        path
    }

    pub fn fail(&self, target: &str, error: TransferError) {
        self.latest(target).sink.failed(error);
    }

    pub fn ack_suspend(&self, target: &str, token: Option<ResumeToken>) {
        self.latest(target).sink.suspended(token);
    }
}

impl TransferEngine for MockEngine {
    fn begin(&self, id: TransferId, source: TransferSource, sink: TransferSink) {
        let begun = Begun {
            id,
            target: sink.target().to_string(),
            request: source.request().clone(),
            token: source.resume_token().cloned(),
            sink,
        };
        self.recorded.lock().unwrap().begun.push(begun);
    }

    fn suspend(&self, id: TransferId) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.control(id);
        recorded.suspends.push(id);
    }

    fn abort(&self, id: TransferId) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.control(id);
        recorded.aborts.push(id);
    }

    fn discard_token(&self, token: ResumeToken) {
        self.recorded.lock().unwrap().discarded.push(token);
    }
}
