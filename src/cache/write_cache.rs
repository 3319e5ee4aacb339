//! Write-back cache with grouped, ordered flushing.
//!
//! Dirty pages live in a `BTreeMap` keyed by [`PageKey`], so contiguous
//! write groups fall out of a range scan. A flush pass walks the dirty
//! files round-robin, each file from its own rotating group pointer,
//! defers groups that were touched since the last pass, locks a chosen
//! group all-or-nothing and writes its members in key order - after
//! making sure the write-ahead log is durable past each page's recorded
//! sequence number. Magic number and CRC32 are stamped into the header
//! just before the bytes hit the file.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::cache::{CacheEntry, CacheStats, PageLockTable};
use crate::common::{CacheConfig, Error, FileId, PageKey, Result};
use crate::memory::DirectMemory;
use crate::storage::{page_format, FileSlot, FileTable};
use crate::wal::{DirtyPage, Lsn, WriteAheadLog};

/// Fill ratio above which the background task flushes forced until the
/// cache is back under it.
pub const FILL_RATIO_HIGH: f64 = 0.9;

/// Fill ratio above which the background task keeps flushing unforced.
pub const FILL_RATIO_LOW: f64 = 0.5;

/// Bookkeeping guarded by one mutex: the dirty-page map, the per-file
/// dirty-page tables handed to the log for recovery, and the flush
/// rotation state. Never held across file or log I/O.
struct WriteState {
    pages: BTreeMap<PageKey, Arc<CacheEntry>>,
    /// Per file: page index -> sequence number at first mark-dirty.
    dirty_tables: HashMap<FileId, BTreeMap<u64, Lsn>>,
    /// Per file: first group start the next pass will consider.
    flush_pointers: HashMap<FileId, u64>,
    /// Round-robin cursor over dirty files.
    next_file: usize,
}

pub struct WriteCache {
    state: Mutex<WriteState>,

    files: Arc<FileTable>,
    page_locks: Arc<PageLockTable>,
    wal: Arc<dyn WriteAheadLog>,
    memory: Arc<DirectMemory>,
    stats: Arc<CacheStats>,

    page_size: usize,
    group_span: u64,
    capacity: usize,
    sync_on_page_flush: bool,
}

impl WriteCache {
    pub fn new(
        config: &CacheConfig,
        files: Arc<FileTable>,
        page_locks: Arc<PageLockTable>,
        wal: Arc<dyn WriteAheadLog>,
        memory: Arc<DirectMemory>,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            state: Mutex::new(WriteState {
                pages: BTreeMap::new(),
                dirty_tables: HashMap::new(),
                flush_pointers: HashMap::new(),
                next_file: 0,
            }),
            files,
            page_locks,
            wal,
            memory,
            stats,
            page_size: config.page_size,
            group_span: config.write_group_span,
            capacity: config.write_cache_pages(),
            sync_on_page_flush: config.sync_on_page_flush,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    pub fn contains(&self, key: PageKey) -> bool {
        self.state.lock().pages.contains_key(&key)
    }

    pub fn get(&self, key: PageKey) -> Option<Arc<CacheEntry>> {
        self.state.lock().pages.get(&key).cloned()
    }

    // ========================================================================
    // Marking dirty
    // ========================================================================

    /// Register an already-resident entry as dirty.
    ///
    /// Re-marking a page that is already in the write cache only refreshes
    /// its recently-touched bit; the dirty-page table keeps the sequence
    /// number of the first marking.
    pub fn mark_dirty_entry(&self, entry: &Arc<CacheEntry>) -> Result<()> {
        entry.set_recently_touched(true);

        let key = entry.key();
        if self.contains(key) {
            return Ok(());
        }
        self.make_room_for(key)?;

        let lsn = entry
            .with_buffer(|handle| {
                let mut bytes = [0u8; 8];
                self.memory.read(handle, page_format::LSN_OFFSET, &mut bytes);
                Lsn(u64::from_le_bytes(bytes))
            })
            .unwrap_or_else(|| entry.loaded_lsn());

        let mut state = self.state.lock();
        entry.set_in_write_cache(true);
        state.pages.insert(key, Arc::clone(entry));
        state
            .dirty_tables
            .entry(key.file_id)
            .or_default()
            .entry(key.page_index)
            .or_insert(lsn);
        trace!(%key, %lsn, "page marked dirty");
        Ok(())
    }

    /// Mark a page dirty that is resident in neither cache, loading its
    /// current content from the raw file (or zeroes past the end).
    pub fn mark_dirty(&self, key: PageKey) -> Result<Arc<CacheEntry>> {
        if let Some(existing) = self.get(key) {
            existing.set_recently_touched(true);
            return Ok(existing);
        }
        self.make_room_for(key)?;

        let slot = self
            .files
            .get(key.file_id)
            .ok_or(Error::FileNotRegistered(key.file_id))?;

        let mut content = vec![0u8; self.page_size];
        {
            let mut file = slot.lock();
            let offset = key.page_index * self.page_size as u64;
            if offset + self.page_size as u64 <= file.filled_up_to() {
                file.read(offset, &mut content)?;
            }
        }
        let lsn = page_format::read_lsn(&content);

        let handle = self.memory.allocate(content);
        let entry = Arc::new(CacheEntry::new(key, lsn, handle));

        let mut state = self.state.lock();
        if let Some(raced) = state.pages.get(&key) {
            // Another thread registered the page while we were reading.
            let raced = Arc::clone(raced);
            drop(state);
            if let Some(handle) = entry.take_buffer() {
                self.memory.free(handle);
            }
            raced.set_recently_touched(true);
            return Ok(raced);
        }
        entry.set_in_write_cache(true);
        state.pages.insert(key, Arc::clone(&entry));
        state
            .dirty_tables
            .entry(key.file_id)
            .or_default()
            .insert(key.page_index, lsn);
        trace!(%key, %lsn, "absent page loaded and marked dirty");
        Ok(entry)
    }

    /// One forced flush pass when the cache is at capacity and `key` is
    /// not yet registered.
    fn make_room_for(&self, key: PageKey) -> Result<()> {
        if self.len() >= self.capacity && !self.contains(key) {
            self.flush_one(true)?;
        }
        Ok(())
    }

    // ========================================================================
    // Flushing
    // ========================================================================

    /// Try to flush one write group. Returns whether a group was written.
    ///
    /// Dirty files are visited round-robin, and within a file, groups in
    /// ascending order starting from the file's rotating pointer. Unless
    /// `forced`, a group with a recently-touched member is deferred: its
    /// touch bits are cleared but nothing is written, so a page must stay
    /// cold for a full rotation before it goes to disk. Groups whose locks
    /// cannot all be taken, or that turn out to contain a pinned page, are
    /// abandoned and the scan moves to the next candidate.
    pub fn flush_one(&self, forced: bool) -> Result<bool> {
        let file_order = {
            let mut state = self.state.lock();
            if state.pages.is_empty() {
                return Ok(false);
            }
            let mut files: Vec<FileId> = state.pages.keys().map(|k| k.file_id).collect();
            files.dedup();
            let start = state.next_file % files.len();
            state.next_file = state.next_file.wrapping_add(1);
            files.rotate_left(start);
            files
        };

        // A failing group must not starve the rest of the pass: record the
        // first error, keep scanning, and surface it only when no group
        // could be written at all.
        let mut first_err = None;
        for file_id in file_order {
            match self.flush_one_in_file(file_id, forced) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(false),
        }
    }

    /// Scan one file's groups from its rotating pointer; write the first
    /// eligible group. A group whose write fails stays dirty and the scan
    /// moves on; the first such error is returned only if the whole scan
    /// wrote nothing.
    fn flush_one_in_file(&self, file_id: FileId, forced: bool) -> Result<bool> {
        let (groups, pointer) = {
            let state = self.state.lock();
            let mut groups: Vec<u64> = state
                .pages
                .range(Self::file_range(file_id))
                .map(|(key, _)| key.group_start(self.group_span))
                .collect();
            groups.dedup();
            let pointer = state.flush_pointers.get(&file_id).copied().unwrap_or(0);
            (groups, pointer)
        };

        // Rotate the (sorted) group list so scanning resumes at the
        // pointer; every group is examined at most once per pass.
        let split = groups.partition_point(|&start| start < pointer);
        let rotation = groups[split..].iter().chain(groups[..split].iter());

        let mut first_err = None;
        for &start in rotation {
            self.state
                .lock()
                .flush_pointers
                .insert(file_id, start + self.group_span);

            let members: Vec<(PageKey, Arc<CacheEntry>)> = {
                let state = self.state.lock();
                state
                    .pages
                    .range(Self::group_range(file_id, start, self.group_span))
                    .map(|(key, entry)| (*key, Arc::clone(entry)))
                    .collect()
            };
            if members.is_empty() {
                continue;
            }

            if !forced && members.iter().any(|(_, e)| e.recently_touched()) {
                for (_, entry) in &members {
                    entry.set_recently_touched(false);
                }
                self.stats.groups_deferred.fetch_add(1, Ordering::Relaxed);
                trace!(%file_id, group_start = start, "hot write group deferred");
                continue;
            }

            let keys: Vec<PageKey> = members.iter().map(|(key, _)| *key).collect();
            let Some(guards) = self.page_locks.try_write_group(&keys) else {
                continue;
            };
            if members.iter().any(|(_, e)| e.is_pinned()) {
                drop(guards);
                continue;
            }

            let outcome = self.write_group(file_id, &members);
            drop(guards);
            for (key, entry) in &members {
                if !entry.in_read_cache() {
                    self.page_locks.release(*key);
                }
            }
            match outcome {
                Ok(()) => {
                    debug!(%file_id, group_start = start, pages = members.len(), "write group flushed");
                    return Ok(true);
                }
                Err(err) => {
                    warn!(%file_id, group_start = start, %err, "write group flush failed");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(false),
        }
    }

    /// Write a locked group's members in key order, then sync once if
    /// configured.
    fn write_group(&self, file_id: FileId, members: &[(PageKey, Arc<CacheEntry>)]) -> Result<()> {
        let slot = self
            .files
            .get(file_id)
            .ok_or(Error::FileNotRegistered(file_id))?;

        for (key, entry) in members {
            self.flush_entry(&slot, *key, entry)?;
        }
        if self.sync_on_page_flush {
            slot.lock().sync()?;
        }
        Ok(())
    }

    /// Flush one page: wait for log durability, stamp the header, write
    /// the bytes, retire the entry from the write cache.
    ///
    /// Caller holds the page's write lock.
    fn flush_entry(&self, slot: &FileSlot, key: PageKey, entry: &Arc<CacheEntry>) -> Result<()> {
        let Some(mut bytes) = entry.with_buffer(|handle| self.memory.copy_out(handle)) else {
            self.retire(key, entry);
            return Ok(());
        };

        let page_lsn = page_format::read_lsn(&bytes);
        if self.wal.flushed_lsn() < Some(page_lsn) {
            self.wal.flush()?;
        }

        page_format::stamp(&mut bytes);
        slot.lock().write(key.page_index * self.page_size as u64, &bytes)?;
        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);

        self.retire(key, entry);
        Ok(())
    }

    /// Drop a flushed page from the dirty map and table; free its buffer
    /// if the read cache no longer holds it either.
    fn retire(&self, key: PageKey, entry: &Arc<CacheEntry>) {
        {
            let mut state = self.state.lock();
            state.pages.remove(&key);
            Self::forget_dirty(&mut state, key);
        }
        entry.set_in_write_cache(false);
        if !entry.in_read_cache() && !entry.is_pinned() {
            if let Some(handle) = entry.take_buffer() {
                self.memory.free(handle);
            }
        }
    }

    /// Flush every dirty page of one file, in key order, then sync.
    ///
    /// All of the file's page locks are taken blocking, in key order; a
    /// pinned page fails the whole call with [`Error::PageInUse`] before
    /// anything is written.
    pub fn flush_file(&self, file_id: FileId) -> Result<()> {
        let members: Vec<(PageKey, Arc<CacheEntry>)> = {
            let state = self.state.lock();
            state
                .pages
                .range(Self::file_range(file_id))
                .map(|(key, entry)| (*key, Arc::clone(entry)))
                .collect()
        };
        if members.is_empty() {
            return Ok(());
        }

        // Ascending key order matches every other multi-lock site.
        let guards: Vec<_> = members
            .iter()
            .map(|(key, _)| self.page_locks.write(*key))
            .collect();

        if let Some((key, _)) = members.iter().find(|(_, e)| e.is_pinned()) {
            return Err(Error::PageInUse(key.file_id, key.page_index));
        }

        let slot = self
            .files
            .get(file_id)
            .ok_or(Error::FileNotRegistered(file_id))?;
        for (key, entry) in &members {
            self.flush_entry(&slot, *key, entry)?;
        }
        slot.lock().sync()?;

        drop(guards);
        for (key, entry) in &members {
            if !entry.in_read_cache() {
                self.page_locks.release(*key);
            }
        }
        debug!(%file_id, pages = members.len(), "file flushed");
        Ok(())
    }

    /// Background maintenance: forced flushing above the high-water mark,
    /// unforced above the low-water mark, otherwise a single unforced
    /// pass so an idle cache still drains.
    pub fn background_pass(&self) -> Result<()> {
        while self.fill_ratio() >= FILL_RATIO_HIGH {
            if !self.flush_one(true)? {
                break;
            }
        }
        while self.fill_ratio() >= FILL_RATIO_LOW {
            if !self.flush_one(false)? {
                break;
            }
        }
        if !self.is_empty() {
            self.flush_one(false)?;
        }
        Ok(())
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Drop every dirty page of one file without writing, returning the
    /// removed entries.
    ///
    /// Every page lock is taken blocking, in key order, so a flush pass
    /// that already locked a group finishes before its pages vanish - a
    /// write landing after the caller shrinks the file would resurrect
    /// stale bytes. A pinned page fails the whole call with
    /// [`Error::PageInUse`] before anything is dropped.
    pub fn discard_file(&self, file_id: FileId) -> Result<Vec<Arc<CacheEntry>>> {
        let members: Vec<(PageKey, Arc<CacheEntry>)> = {
            let state = self.state.lock();
            state
                .pages
                .range(Self::file_range(file_id))
                .map(|(key, entry)| (*key, Arc::clone(entry)))
                .collect()
        };

        let guards: Vec<_> = members
            .iter()
            .map(|(key, _)| self.page_locks.write(*key))
            .collect();

        if let Some((key, _)) = members.iter().find(|(_, e)| e.is_pinned()) {
            return Err(Error::PageInUse(key.file_id, key.page_index));
        }

        let entries: Vec<Arc<CacheEntry>> = {
            let mut state = self.state.lock();
            let entries = members
                .iter()
                .filter_map(|(key, _)| state.pages.remove(key))
                .collect();
            state.dirty_tables.remove(&file_id);
            state.flush_pointers.remove(&file_id);
            entries
        };
        for entry in &entries {
            entry.set_in_write_cache(false);
        }

        drop(guards);
        for (key, entry) in &members {
            if !entry.in_read_cache() {
                self.page_locks.release(*key);
            }
        }
        Ok(entries)
    }

    // ========================================================================
    // Dirty-page table
    // ========================================================================

    /// Hand the current dirty-page tables of all files to the log for
    /// recovery checkpointing.
    pub fn log_dirty_pages_table(&self) -> Result<()> {
        let tables: Vec<(FileId, Vec<(u64, Lsn)>)> = {
            let state = self.state.lock();
            state
                .dirty_tables
                .iter()
                .map(|(&file_id, table)| {
                    (file_id, table.iter().map(|(&p, &l)| (p, l)).collect())
                })
                .collect()
        };

        let mut records = Vec::new();
        for (file_id, pages) in tables {
            let Some(slot) = self.files.get(file_id) else {
                continue;
            };
            let file_name = slot.lock().name();
            for (page_index, lsn) in pages {
                records.push(DirtyPage {
                    file_name: file_name.clone(),
                    page_index,
                    lsn,
                });
            }
        }
        self.wal.log_dirty_pages(records)
    }

    /// Sequence number recorded for a page at first mark-dirty, if still
    /// dirty.
    pub fn dirty_lsn(&self, key: PageKey) -> Option<Lsn> {
        self.state
            .lock()
            .dirty_tables
            .get(&key.file_id)
            .and_then(|table| table.get(&key.page_index).copied())
    }

    fn forget_dirty(state: &mut WriteState, key: PageKey) {
        let drained = match state.dirty_tables.get_mut(&key.file_id) {
            Some(table) => {
                table.remove(&key.page_index);
                table.is_empty()
            }
            None => false,
        };
        if drained {
            state.dirty_tables.remove(&key.file_id);
        }
    }

    fn file_range(file_id: FileId) -> std::ops::RangeInclusive<PageKey> {
        PageKey::new(file_id, 0)..=PageKey::new(file_id, u64::MAX)
    }

    fn group_range(file_id: FileId, start: u64, span: u64) -> std::ops::Range<PageKey> {
        PageKey::new(file_id, start)..PageKey::new(file_id, start.saturating_add(span))
    }
}
