//! Per-attachment reader/writer locks.
//!
//! Mutating operations (store, extract, delete) hold the write side for an
//! ID; list, read, search and metadata lookups hold the read side. Distinct
//! IDs never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Entries beyond this count trigger a sweep of idle locks.
const SWEEP_THRESHOLD: usize = 256;

#[derive(Debug, Default)]
pub(crate) struct EntryLocks {
    locks: Mutex<HashMap<u64, Arc<RwLock<()>>>>,
}

impl EntryLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, attachment_id: u64) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if locks.len() >= SWEEP_THRESHOLD {
            // Only the map holds an idle lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        Arc::clone(locks.entry(attachment_id).or_default())
    }

    /// Waits for shared access to an entry.
    pub(crate) async fn read(&self, attachment_id: u64) -> OwnedRwLockReadGuard<()> {
        self.lock_for(attachment_id).read_owned().await
    }

    /// Waits for exclusive access to an entry.
    pub(crate) async fn write(&self, attachment_id: u64) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(attachment_id).write_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
