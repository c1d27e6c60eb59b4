//! Per-run ledger of accepted product identities
//!
//! The ledger is the only product-level synchronization point between
//! workers: `accept_batch` decides a whole batch under one lock, so exactly
//! one worker wins the right to emit a given product.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LedgerInner {
    keys: HashSet<String>,
    /// Keys accepted since the last checkpoint
    unflushed: Vec<String>,
}

impl LedgerInner {
    fn insert(&mut self, key: String) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.insert(key.clone());
        self.unflushed.push(key);
        true
    }
}

/// Set of product keys already recorded in the current run
#[derive(Debug, Default)]
pub struct DedupLedger {
    inner: Mutex<LedgerInner>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from keys persisted by an earlier, interrupted run
    pub fn restore(keys: impl IntoIterator<Item = String>) -> Self {
        let ledger = Self::new();
        ledger.lock().keys.extend(keys);
        ledger
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts `key` if absent
    ///
    /// Returns true if this call inserted the key, false if it was already
    /// recorded.
    #[cfg(test)]
    pub fn check_and_insert(&self, key: &str) -> bool {
        self.lock().insert(key.to_string())
    }

    /// Splits `items` into those newly inserted and the number of duplicates
    ///
    /// The whole batch is decided under one lock; duplicates inside the batch
    /// itself are also rejected.
    pub fn accept_batch<T>(&self, items: Vec<T>, key: impl Fn(&T) -> String) -> (Vec<T>, u64) {
        let mut inner = self.lock();
        let mut accepted = Vec::with_capacity(items.len());
        let mut duplicates = 0;

        for item in items {
            if inner.insert(key(&item)) {
                accepted.push(item);
            } else {
                duplicates += 1;
            }
        }

        (accepted, duplicates)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes the keys accepted since the previous call, for persistence
    pub fn take_unflushed(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().unflushed)
    }

    /// Puts keys back after a failed checkpoint so the next one retries them
    pub fn return_unflushed(&self, keys: Vec<String>) {
        let mut inner = self.lock();
        let newer = std::mem::take(&mut inner.unflushed);
        inner.unflushed = keys;
        inner.unflushed.extend(newer);
    }
}
