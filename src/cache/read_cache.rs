//! 2Q read cache.
//!
//! Three queues share one capacity budget:
//! - `a1in` - FIFO of pages seen once, capped at a quarter of capacity
//! - `a1out` - ghost queue of identities evicted from `a1in`, capped at
//!   half of capacity
//! - `am` - LRU of pages re-referenced while their identity sat in
//!   `a1out`
//!
//! A page loaded for the first time enters `a1in`. Evicted from there,
//! its buffer is dropped but its identity lingers in `a1out`; a reload
//! while the ghost is still present promotes the page straight into
//! `am`. One-shot scans therefore churn through `a1in` without ever
//! displacing the hot working set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use crate::cache::{CacheEntry, CacheStats, LruList};
use crate::common::{Error, FileId, PageKey, Result};
use crate::memory::DirectMemory;

/// How a page entered the read cache on admission. Carries the entry
/// that is actually resident afterwards.
#[derive(Debug, Clone)]
pub enum CacheLoad {
    /// The key was already resident; the caller's duplicate was discarded.
    AlreadyResident(Arc<CacheEntry>),
    /// The identity was found in the ghost queue; admitted into `am`.
    PromotedFromGhost(Arc<CacheEntry>),
    /// First sighting; admitted into `a1in`.
    Fresh(Arc<CacheEntry>),
}

impl CacheLoad {
    /// The resident entry, whichever way it got there.
    pub fn entry(&self) -> &Arc<CacheEntry> {
        match self {
            Self::AlreadyResident(entry)
            | Self::PromotedFromGhost(entry)
            | Self::Fresh(entry) => entry,
        }
    }

    pub fn into_entry(self) -> Arc<CacheEntry> {
        match self {
            Self::AlreadyResident(entry)
            | Self::PromotedFromGhost(entry)
            | Self::Fresh(entry) => entry,
        }
    }
}

pub struct TwoQCache {
    am: LruList,
    a1in: LruList,
    a1out: LruList,

    /// Shared data-page budget of `am` + `a1in`.
    max_size: usize,
    /// `a1in` bound: `max_size / 4`.
    k_in: usize,
    /// `a1out` bound: `max_size / 2`.
    k_out: usize,

    grow_on_exhaustion: bool,
    growth_step: f64,

    memory: Arc<DirectMemory>,
    stats: Arc<CacheStats>,
}

impl TwoQCache {
    pub fn new(
        max_size: usize,
        grow_on_exhaustion: bool,
        growth_step: f64,
        memory: Arc<DirectMemory>,
        stats: Arc<CacheStats>,
    ) -> Self {
        let max_size = max_size.max(4);
        Self {
            am: LruList::new(),
            a1in: LruList::new(),
            a1out: LruList::new(),
            max_size,
            k_in: max_size / 4,
            k_out: max_size / 2,
            grow_on_exhaustion,
            growth_step,
            memory,
            stats,
        }
    }

    /// Current data-page capacity. Grows when eviction finds every
    /// candidate pinned and growth is enabled.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of resident data pages (`am` + `a1in`; ghosts excluded).
    pub fn len(&self) -> usize {
        self.am.len() + self.a1in.len()
    }

    pub fn is_empty(&self) -> bool {
        self.am.is_empty() && self.a1in.is_empty()
    }

    /// Look up a resident page and record the access.
    ///
    /// A hit in `am` refreshes the entry's LRU position; a hit in `a1in`
    /// does not - 2Q promotes only on re-reference after eviction.
    pub fn hit(&mut self, key: PageKey) -> Option<Arc<CacheEntry>> {
        if let Some(entry) = self.am.move_to_mru(key) {
            return Some(entry);
        }
        self.a1in.get(key).cloned()
    }

    /// Look up a resident page without touching queue positions.
    pub fn peek(&self, key: PageKey) -> Option<&Arc<CacheEntry>> {
        self.am.get(key).or_else(|| self.a1in.get(key))
    }

    /// Admit a freshly loaded page.
    ///
    /// `file_pages` is the per-file registry of page indexes known to the
    /// read path; eviction of a page with no surviving ghost removes it
    /// from there as well.
    pub fn admit(
        &mut self,
        entry: Arc<CacheEntry>,
        file_pages: &mut HashMap<FileId, HashSet<u64>>,
    ) -> Result<CacheLoad> {
        let key = entry.key();

        // Races with another load of the same key are serialized by the
        // per-page lock, but a concurrent admission may still have landed
        // between the caller's miss check and now.
        if let Some(existing) = self.peek(key).cloned() {
            if !Arc::ptr_eq(&existing, &entry) && !entry.in_write_cache() {
                if let Some(handle) = entry.take_buffer() {
                    self.memory.free(handle);
                }
            }
            self.hit(key);
            return Ok(CacheLoad::AlreadyResident(existing));
        }

        if self.a1out.remove(key).is_some() {
            // Ghost hit - the page proved its re-reference distance.
            self.make_room(file_pages)?;
            entry.set_in_read_cache(true);
            self.am.put_to_mru(Arc::clone(&entry));
            file_pages.entry(key.file_id).or_default().insert(key.page_index);
            return Ok(CacheLoad::PromotedFromGhost(entry));
        }

        self.make_room(file_pages)?;
        entry.set_in_read_cache(true);
        self.a1in.put_to_mru(Arc::clone(&entry));
        file_pages.entry(key.file_id).or_default().insert(key.page_index);
        Ok(CacheLoad::Fresh(entry))
    }

    /// Remove a page from whichever queue holds it.
    ///
    /// Ghost identities are dropped silently; only data entries are
    /// returned. The caller decides what happens to the entry's buffer.
    pub fn remove(&mut self, key: PageKey) -> Option<Arc<CacheEntry>> {
        if let Some(entry) = self.am.remove(key).or_else(|| self.a1in.remove(key)) {
            entry.set_in_read_cache(false);
            return Some(entry);
        }
        self.a1out.remove(key);
        None
    }

    /// Drain every resident data page, coldest first, and drop all
    /// ghosts. Used by `clear` and `close`.
    pub fn drain_data(&mut self) -> Vec<Arc<CacheEntry>> {
        self.a1out.drain();
        let mut drained = self.a1in.drain();
        drained.extend(self.am.drain());
        for entry in &drained {
            entry.set_in_read_cache(false);
        }
        drained
    }

    /// Evict one page if the data queues are at capacity.
    ///
    /// Mirrors the admission balance of 2Q: an overfull `a1in` gives up
    /// its FIFO head to the ghost queue, otherwise `am` sheds its LRU
    /// tail outright.
    fn make_room(&mut self, file_pages: &mut HashMap<FileId, HashSet<u64>>) -> Result<()> {
        if self.am.len() + self.a1in.len() < self.max_size {
            return Ok(());
        }

        if self.a1in.len() > self.k_in {
            match self.a1in.remove_lru() {
                None => self.grow_or_fail()?,
                Some(victim) => {
                    self.release_victim(&victim);
                    self.a1out
                        .put_to_mru(Arc::new(CacheEntry::ghost(victim.key())));
                    if self.a1out.len() > self.k_out {
                        if let Some(ghost) = self.a1out.remove_lru() {
                            forget_page(file_pages, ghost.key());
                        }
                    }
                }
            }
        } else {
            match self.am.remove_lru() {
                None => self.grow_or_fail()?,
                Some(victim) => {
                    self.release_victim(&victim);
                    forget_page(file_pages, victim.key());
                }
            }
        }
        Ok(())
    }

    /// Strip the read-cache claim from an evicted entry and free its
    /// buffer unless the write cache still needs it for a pending flush.
    fn release_victim(&self, victim: &CacheEntry) {
        victim.set_in_read_cache(false);
        if !victim.in_write_cache() {
            if let Some(handle) = victim.take_buffer() {
                self.memory.free(handle);
            }
        }
        self.stats
            .evictions
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    fn grow_or_fail(&mut self) -> Result<()> {
        if !self.grow_on_exhaustion {
            return Err(Error::CacheExhausted);
        }
        let grown = ((self.max_size as f64) * (1.0 + self.growth_step)).ceil() as usize;
        let grown = grown.max(self.max_size + 1);
        warn!(
            old_size = self.max_size,
            new_size = grown,
            "read cache exhausted by pinned pages, growing"
        );
        self.max_size = grown;
        self.k_in = grown / 4;
        self.k_out = grown / 2;
        Ok(())
    }

    #[cfg(test)]
    fn queue_sizes(&self) -> (usize, usize, usize) {
        (self.am.len(), self.a1in.len(), self.a1out.len())
    }
}

fn forget_page(file_pages: &mut HashMap<FileId, HashSet<u64>>, key: PageKey) {
    if let Some(pages) = file_pages.get_mut(&key.file_id) {
        pages.remove(&key.page_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::Lsn;

    fn cache(max_size: usize, grow: bool) -> (TwoQCache, Arc<DirectMemory>) {
        let memory = Arc::new(DirectMemory::new());
        let cache = TwoQCache::new(
            max_size,
            grow,
            0.1,
            Arc::clone(&memory),
            Arc::new(CacheStats::new()),
        );
        (cache, memory)
    }

    fn entry(memory: &DirectMemory, page_index: u64) -> Arc<CacheEntry> {
        let handle = memory.allocate(vec![0u8; 32]);
        Arc::new(CacheEntry::new(
            PageKey::new(FileId::new(1), page_index),
            Lsn(0),
            handle,
        ))
    }

    fn key(page_index: u64) -> PageKey {
        PageKey::new(FileId::new(1), page_index)
    }

    #[test]
    fn test_fresh_pages_enter_a1in() {
        let (mut cache, memory) = cache(8, false);
        let mut file_pages = HashMap::new();

        let load = cache.admit(entry(&memory, 0), &mut file_pages).unwrap();
        assert!(matches!(load, CacheLoad::Fresh(_)));
        assert_eq!(cache.queue_sizes(), (0, 1, 0));
        assert!(file_pages[&FileId::new(1)].contains(&0));
    }

    #[test]
    fn test_eviction_ghosts_a1in_victims() {
        // Capacity 4, K_IN = 1: the second admission overflows a1in.
        let (mut cache, memory) = cache(4, false);
        let mut file_pages = HashMap::new();

        for i in 0..4 {
            cache.admit(entry(&memory, i), &mut file_pages).unwrap();
        }
        assert_eq!(cache.len(), 4);

        cache.admit(entry(&memory, 4), &mut file_pages).unwrap();

        // Page 0 was the FIFO head of a1in; its buffer is gone but its
        // identity survives as a ghost.
        let (_, _, ghosts) = cache.queue_sizes();
        assert_eq!(ghosts, 1);
        assert!(cache.peek(key(0)).is_none());
        assert_eq!(memory.allocated(), 4);
    }

    #[test]
    fn test_ghost_hit_promotes_to_am() {
        let (mut cache, memory) = cache(4, false);
        let mut file_pages = HashMap::new();

        for i in 0..5 {
            cache.admit(entry(&memory, i), &mut file_pages).unwrap();
        }
        // Page 0 is now a ghost; reloading it must land in am.
        let load = cache.admit(entry(&memory, 0), &mut file_pages).unwrap();
        assert!(matches!(load, CacheLoad::PromotedFromGhost(_)));

        let (am, _, _) = cache.queue_sizes();
        assert_eq!(am, 1);
        assert!(cache.peek(key(0)).is_some());
    }

    #[test]
    fn test_hit_in_a1in_does_not_promote() {
        let (mut cache, memory) = cache(8, false);
        let mut file_pages = HashMap::new();

        cache.admit(entry(&memory, 0), &mut file_pages).unwrap();
        assert!(cache.hit(key(0)).is_some());

        let (am, a1in, _) = cache.queue_sizes();
        assert_eq!((am, a1in), (0, 1));
    }

    #[test]
    fn test_dirty_victim_keeps_buffer() {
        let (mut cache, memory) = cache(4, false);
        let mut file_pages = HashMap::new();

        let dirty = entry(&memory, 0);
        dirty.set_in_write_cache(true);
        cache.admit(dirty, &mut file_pages).unwrap();
        for i in 1..5 {
            cache.admit(entry(&memory, i), &mut file_pages).unwrap();
        }

        // Page 0 was evicted but is still dirty; the write cache owns
        // the buffer now, so nothing was freed.
        assert!(cache.peek(key(0)).is_none());
        assert_eq!(memory.allocated(), 5);
    }

    #[test]
    fn test_exhaustion_without_growth() {
        let (mut cache, memory) = cache(4, false);
        let mut file_pages = HashMap::new();

        let pinned: Vec<_> = (0..4)
            .map(|i| {
                let e = entry(&memory, i);
                e.pin();
                cache.admit(Arc::clone(&e), &mut file_pages).unwrap();
                e
            })
            .collect();

        let err = cache.admit(entry(&memory, 99), &mut file_pages).unwrap_err();
        assert!(matches!(err, Error::CacheExhausted));
        drop(pinned);
    }

    #[test]
    fn test_exhaustion_grows_when_enabled() {
        let (mut cache, memory) = cache(4, true);
        let mut file_pages = HashMap::new();

        for i in 0..4 {
            let e = entry(&memory, i);
            e.pin();
            cache.admit(e, &mut file_pages).unwrap();
        }

        cache.admit(entry(&memory, 99), &mut file_pages).unwrap();
        assert!(cache.max_size() > 4);
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn test_remove_returns_data_entry_only() {
        let (mut cache, memory) = cache(4, false);
        let mut file_pages = HashMap::new();

        for i in 0..5 {
            cache.admit(entry(&memory, i), &mut file_pages).unwrap();
        }

        // Page 0 is a ghost by now.
        assert!(cache.remove(key(0)).is_none());
        let removed = cache.remove(key(4)).unwrap();
        assert!(!removed.in_read_cache());
    }

    #[test]
    fn test_drain_data_leaves_nothing_resident() {
        let (mut cache, memory) = cache(4, false);
        let mut file_pages = HashMap::new();

        for i in 0..5 {
            cache.admit(entry(&memory, i), &mut file_pages).unwrap();
        }
        let drained = cache.drain_data();
        assert_eq!(drained.len(), 4);
        assert!(cache.is_empty());
        assert_eq!(cache.queue_sizes(), (0, 0, 0));
    }
}
