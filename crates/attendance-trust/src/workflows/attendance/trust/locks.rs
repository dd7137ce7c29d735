use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Named mutual-exclusion slots so captures on the same key run one at a time.
///
/// Only keys that are currently held are tracked; a key leaves the registry when its
/// guard drops.
#[derive(Debug, Default)]
pub(crate) struct SerialLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl SerialLocks {
    /// Block until `key` is free, then hold it until the returned guard drops.
    pub(crate) fn hold(&self, key: String) -> SlotGuard<'_> {
        let mut held = self.registry();
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.clone());
        SlotGuard { locks: self, key }
    }

    #[cfg(test)]
    pub(crate) fn held_keys(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its key on drop, including while unwinding from a panic.
#[derive(Debug)]
pub(crate) struct SlotGuard<'a> {
    locks: &'a SerialLocks,
    key: String,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.locks.registry().remove(&self.key);
        self.locks.released.notify_all();
    }
}
