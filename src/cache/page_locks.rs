//! Lazily created per-page reader/writer locks.
//!
//! One `RwLock` per [`PageKey`], created on first use with an atomic
//! insert-if-absent, guards concurrent load-vs-flush and flush-vs-flush on
//! the same page. Guards are `Arc`-owned so they can be collected for a
//! whole write group and dropped together. The table is garbage-collected
//! opportunistically once both caches have dropped a key.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};

use crate::common::PageKey;

/// Owned write guard over one page lock.
pub type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

pub struct PageLockTable {
    locks: Mutex<HashMap<PageKey, Arc<RwLock<()>>>>,
}

impl PageLockTable {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: PageKey) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(RwLock::new(()))))
    }

    /// Block until the page's write lock is acquired.
    pub fn write(&self, key: PageKey) -> PageWriteGuard {
        self.lock_for(key).write_arc()
    }

    /// Try to acquire the page's write lock without blocking.
    pub fn try_write(&self, key: PageKey) -> Option<PageWriteGuard> {
        self.lock_for(key).try_write_arc()
    }

    /// Acquire write locks on every key of a write group, all or nothing.
    ///
    /// On the first contended key, already-acquired guards are dropped and
    /// `None` is returned; the flush pass abandons the group instead of
    /// risking a deadlock against a concurrent load or flush.
    pub fn try_write_group(&self, keys: &[PageKey]) -> Option<Vec<PageWriteGuard>> {
        let mut guards = Vec::with_capacity(keys.len());
        for &key in keys {
            match self.try_write(key) {
                Some(guard) => guards.push(guard),
                None => return None, // dropping `guards` rolls back partial locks
            }
        }
        Some(guards)
    }

    /// Drop the lock for a key nobody references anymore.
    ///
    /// A lock still held or waited on (strong count above one) is kept, so
    /// no two lock instances can ever guard the same page concurrently.
    pub fn release(&self, key: PageKey) {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(&key) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

impl Default for PageLockTable {
    fn default() -> Self {
        Self::new()
    }
}
