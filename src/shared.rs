use std::sync::Arc;

use parking_lot::Mutex;

use crate::ledger::Ledger;

/// Cloneable handle that serialises every writer on one lock, so each
/// read-modify-write of a score runs to completion before the next starts.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Runs `f` with exclusive access. Keep `f` short; nothing else can read
    /// or write while it runs.
    pub fn with<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn snapshot(&self) -> Ledger {
        self.inner.lock().clone()
    }
}
