//! Per-transfer control flags for suspend/abort.
//!
//! Each running transfer is registered with a flag. `suspend` and `abort`
//! raise the flag; the transfer loop polls it and stops at the next
//! opportunity. Abort outranks suspend: once aborted, a later suspend
//! request cannot downgrade the signal.
//!
//! A request can reach the engine before the transfer it names has been
//! registered (dispatch and control run on different threads). Such requests
//! are held and applied when the transfer registers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::TransferId;

/// What a running transfer has been asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ControlSignal {
    Run,
    Suspend,
    Abort,
}

impl ControlSignal {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ControlSignal::Run,
            1 => ControlSignal::Suspend,
            _ => ControlSignal::Abort,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ControlSignal::Run => 0,
            ControlSignal::Suspend => 1,
            ControlSignal::Abort => 2,
        }
    }
}

/// Flag shared between the registry and one running transfer.
#[derive(Debug, Clone)]
pub struct ControlFlag(Arc<AtomicU8>);

impl ControlFlag {
    fn new(signal: ControlSignal) -> Self {
        ControlFlag(Arc::new(AtomicU8::new(signal.as_u8())))
    }

    pub fn get(&self) -> ControlSignal {
        ControlSignal::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn should_stop(&self) -> bool {
        self.get() != ControlSignal::Run
    }

    fn raise(&self, signal: ControlSignal) {
        self.0.fetch_max(signal.as_u8(), Ordering::AcqRel);
    }
}

/// Requests for unregistered ids kept at most; the oldest ids go first.
const MAX_PENDING: usize = 256;

#[derive(Debug, Default)]
struct Flags {
    running: HashMap<TransferId, ControlFlag>,
    pending: BTreeMap<TransferId, ControlSignal>,
}

/// Registry of transfer id -> control flag.
#[derive(Debug, Default)]
pub struct TransferControl {
    transfers: Mutex<Flags>,
}

impl TransferControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.transfers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a transfer before it starts; returns the flag the transfer loop polls.
    /// The flag starts raised if a request for `id` arrived early.
    pub fn register(&self, id: TransferId) -> ControlFlag {
        let mut flags = self.lock();
        let signal = flags.pending.remove(&id).unwrap_or(ControlSignal::Run);
        let flag = ControlFlag::new(signal);
        flags.running.insert(id, flag.clone());
        flag
    }

    /// Forget a transfer once its terminal event has been produced.
    pub fn unregister(&self, id: TransferId) {
        let mut flags = self.lock();
        flags.running.remove(&id);
        flags.pending.remove(&id);
    }

    /// Raise `signal` for `id`. Returns false if the transfer is not running
    /// yet; the request is then held for its registration.
    pub fn request(&self, id: TransferId, signal: ControlSignal) -> bool {
        let mut flags = self.lock();
        if let Some(flag) = flags.running.get(&id) {
            flag.raise(signal);
            return true;
        }
        let held = flags.pending.entry(id).or_insert(signal);
        *held = (*held).max(signal);
        while flags.pending.len() > MAX_PENDING {
            flags.pending.pop_first();
        }
        false
    }

    /// Number of registered (running) transfers.
    pub fn len(&self) -> usize {
        self.lock().running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
