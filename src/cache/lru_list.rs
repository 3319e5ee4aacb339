//! Ordered list of cache entries with O(log n) LRU maintenance.
//!
//! Backs the three 2Q queues. Recency is tracked with a monotonically
//! increasing tick: each admission or move-to-MRU assigns the entry the
//! next tick, and a `BTreeMap` keyed by tick keeps the queue ordered from
//! coldest to hottest.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::common::PageKey;

pub struct LruList {
    entries: HashMap<PageKey, (u64, Arc<CacheEntry>)>,
    order: BTreeMap<u64, PageKey>,
    next_tick: u64,
}

impl LruList {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: PageKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Look up an entry without touching its position.
    pub fn get(&self, key: PageKey) -> Option<&Arc<CacheEntry>> {
        self.entries.get(&key).map(|(_, entry)| entry)
    }

    /// Insert an entry at the MRU position, or move it there if already
    /// present.
    pub fn put_to_mru(&mut self, entry: Arc<CacheEntry>) {
        let key = entry.key();
        if let Some((tick, _)) = self.entries.remove(&key) {
            self.order.remove(&tick);
        }
        let tick = self.next_tick;
        self.next_tick += 1;
        self.order.insert(tick, key);
        self.entries.insert(key, (tick, entry));
    }

    /// Move an existing entry to the MRU position.
    pub fn move_to_mru(&mut self, key: PageKey) -> Option<Arc<CacheEntry>> {
        let (tick, entry) = self.entries.remove(&key)?;
        self.order.remove(&tick);

        let tick = self.next_tick;
        self.next_tick += 1;
        self.order.insert(tick, key);
        self.entries.insert(key, (tick, Arc::clone(&entry)));
        Some(entry)
    }

    /// Remove a specific entry.
    pub fn remove(&mut self, key: PageKey) -> Option<Arc<CacheEntry>> {
        let (tick, entry) = self.entries.remove(&key)?;
        self.order.remove(&tick);
        Some(entry)
    }

    /// Remove and return the coldest unpinned entry.
    ///
    /// Pinned entries are skipped and keep their position. Returns `None`
    /// when the list is empty or every entry is pinned - the caller treats
    /// that as cache exhaustion.
    pub fn remove_lru(&mut self) -> Option<Arc<CacheEntry>> {
        let victim_tick = self
            .order
            .iter()
            .find(|&(_, key)| {
                self.entries
                    .get(key)
                    .is_some_and(|(_, entry)| !entry.is_pinned())
            })
            .map(|(&tick, _)| tick)?;

        let key = self.order.remove(&victim_tick)?;
        let (_, entry) = self.entries.remove(&key)?;
        Some(entry)
    }

    /// Drain every entry, coldest first.
    pub fn drain(&mut self) -> Vec<Arc<CacheEntry>> {
        let order = std::mem::take(&mut self.order);
        let mut entries = std::mem::take(&mut self.entries);
        order
            .into_values()
            .filter_map(|key| entries.remove(&key).map(|(_, entry)| entry))
            .collect()
    }
}

impl Default for LruList {
    fn default() -> Self {
        Self::new()
    }
}
