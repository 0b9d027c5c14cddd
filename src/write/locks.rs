//! Per-key advisory locks
//!
//! Serializes read-validate-write cycles racing on the same key within
//! this process. No cross-process guarantee.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::datastore::Key;

/// Set of keys currently held, with a condvar for waiters
#[derive(Debug, Default)]
pub struct LockRegistry {
    held: Mutex<HashSet<Key>>,
    released: Condvar,
}

/// Holds the lock on one key until dropped
#[derive(Debug)]
pub struct LockGuard<'a> {
    registry: &'a LockRegistry,
    key: Key,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `key` is free, then takes it
    pub fn acquire(&self, key: &Key) -> LockGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.clone());
        LockGuard {
            registry: self,
            key: key.clone(),
        }
    }

    pub fn is_locked(&self, key: &Key) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn release(&self, key: &Key) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(key);
        drop(held);
        self.released.notify_all();
    }
}

impl LockGuard<'_> {
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}
