//! Disk cache facade - the single entry point the rest of the engine uses.
//!
//! Owns the file table, the 2Q read cache, the write-back cache and the
//! background flusher, and stitches them together behind the load / release /
//! mark-dirty / flush surface.
//!
//! # Locking
//! Two levels, deliberately:
//! - one coarse mutex over the structural state (file bookkeeping + read
//!   cache) for rare lifecycle events and queue maintenance,
//! - per-page locks for frequent content operations.
//!
//! The coarse lock is never held across page I/O: a read-cache miss drops
//! it, fetches the page under its per-page lock only, and re-takes it for
//! admission.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{
    CacheEntry, CacheStats, Flusher, PageLockTable, StatsSnapshot, TwoQCache, WriteCache,
};
use crate::common::{CacheConfig, Error, FileId, PageKey, Result};
use crate::memory::DirectMemory;
use crate::storage::{page_format, FileTable, RawFile};
use crate::wal::{NoopLog, WriteAheadLog};

/// Which integrity check a stored page failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCheckFailure {
    MagicMismatch,
    ChecksumMismatch,
}

/// One mismatch found by [`DiskCache::check_pages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageVerificationError {
    pub file_name: String,
    pub file_id: FileId,
    pub page_index: u64,
    pub failure: PageCheckFailure,
}

impl fmt::Display for PageVerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.failure {
            PageCheckFailure::MagicMismatch => "magic number mismatch",
            PageCheckFailure::ChecksumMismatch => "checksum mismatch",
        };
        write!(f, "{} in page {} of '{}'", what, self.page_index, self.file_name)
    }
}

/// A pinned page handed out by [`DiskCache::load`].
///
/// The handle reads and writes the resident buffer directly. It does not
/// release the pin; callers pair every `load` with a
/// [`DiskCache::release`], and mark mutated pages dirty explicitly.
pub struct PageHandle {
    entry: Arc<CacheEntry>,
    memory: Arc<DirectMemory>,
    page_size: usize,
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("file_id", &self.file_id())
            .field("page_index", &self.page_index())
            .finish_non_exhaustive()
    }
}

impl PageHandle {
    pub fn file_id(&self) -> FileId {
        self.entry.file_id()
    }

    pub fn page_index(&self) -> u64 {
        self.entry.page_index()
    }

    /// Read a byte range of the page.
    ///
    /// # Panics
    /// Panics if the range reaches past the end of the page, or if the
    /// pinned entry lost its buffer - both are caller bugs worth failing
    /// fast on.
    pub fn read(&self, offset: usize, buf: &mut [u8]) {
        self.check_range(offset, buf.len());
        let done = self.entry.with_buffer(|h| self.memory.read(h, offset, buf));
        assert!(done.is_some(), "pinned page {} has no buffer", self.entry.key());
    }

    /// Write a byte range of the page. Does not mark the page dirty.
    ///
    /// # Panics
    /// Panics if the range reaches past the end of the page or if the
    /// pinned entry lost its buffer.
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        self.check_range(offset, bytes.len());
        let done = self.entry.with_buffer(|h| self.memory.write(h, offset, bytes));
        assert!(done.is_some(), "pinned page {} has no buffer", self.entry.key());
    }

    fn check_range(&self, offset: usize, len: usize) {
        assert!(
            offset.saturating_add(len) <= self.page_size,
            "range {}..{} outside page {} of {} bytes",
            offset,
            offset.saturating_add(len),
            self.entry.key(),
            self.page_size
        );
    }

    /// Record the sequence number of a mutation in the page header, so a
    /// later flush knows how far the log must be durable.
    pub fn set_lsn(&self, lsn: crate::wal::Lsn) {
        self.write(page_format::LSN_OFFSET, &lsn.0.to_le_bytes());
    }

    pub fn lsn(&self) -> crate::wal::Lsn {
        let mut bytes = [0u8; 8];
        self.read(page_format::LSN_OFFSET, &mut bytes);
        crate::wal::Lsn(u64::from_le_bytes(bytes))
    }
}

/// Structural state behind the coarse lock.
struct CacheState {
    read_cache: TwoQCache,
    /// Per file, the page indexes known to the read path (data or ghost).
    file_pages: HashMap<FileId, HashSet<u64>>,
    names: HashMap<FileId, String>,
    ids_by_name: HashMap<String, FileId>,
    next_file_id: u64,
}

pub struct DiskCache {
    state: Mutex<CacheState>,

    files: Arc<FileTable>,
    write_cache: Arc<WriteCache>,
    page_locks: Arc<PageLockTable>,
    memory: Arc<DirectMemory>,
    stats: Arc<CacheStats>,
    flusher: Mutex<Option<Flusher>>,

    root: PathBuf,
    page_size: usize,
}

impl DiskCache {
    /// Open a cache over `root` with a no-op log (page writes never wait).
    pub fn open<P: AsRef<Path>>(root: P, config: CacheConfig) -> Result<Self> {
        Self::with_log(root, config, Arc::new(NoopLog), Arc::new(DirectMemory::new()))
    }

    /// Open a cache over `root` with explicit collaborators.
    pub fn with_log<P: AsRef<Path>>(
        root: P,
        config: CacheConfig,
        wal: Arc<dyn WriteAheadLog>,
        memory: Arc<DirectMemory>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let files = Arc::new(FileTable::new());
        let page_locks = Arc::new(PageLockTable::new());
        let stats = Arc::new(CacheStats::new());

        let write_cache = Arc::new(WriteCache::new(
            &config,
            Arc::clone(&files),
            Arc::clone(&page_locks),
            wal,
            Arc::clone(&memory),
            Arc::clone(&stats),
        ));
        let read_cache = TwoQCache::new(
            config.max_pages(),
            config.grow_on_exhaustion,
            config.growth_step,
            Arc::clone(&memory),
            Arc::clone(&stats),
        );
        let flusher = Flusher::start(Arc::clone(&write_cache), config.flush_interval)?;

        Ok(Self {
            state: Mutex::new(CacheState {
                read_cache,
                file_pages: HashMap::new(),
                names: HashMap::new(),
                ids_by_name: HashMap::new(),
                next_file_id: 1,
            }),
            files,
            write_cache,
            page_locks,
            memory,
            stats,
            flusher: Mutex::new(Some(flusher)),
            root,
            page_size: config.page_size,
        })
    }

    // ========================================================================
    // File lifecycle
    // ========================================================================

    /// Register a file under `name`, creating it on disk if absent.
    ///
    /// Opening an already-open name returns the existing id.
    pub fn open_file(&self, name: &str) -> Result<FileId> {
        let mut state = self.state.lock();
        if let Some(&file_id) = state.ids_by_name.get(name) {
            return Ok(file_id);
        }

        let file = RawFile::open_or_create(self.root.join(name))?;
        let file_id = FileId::new(state.next_file_id);
        state.next_file_id += 1;

        self.files.insert(file_id, file);
        state.file_pages.insert(file_id, HashSet::new());
        state.names.insert(file_id, name.to_owned());
        state.ids_by_name.insert(name.to_owned(), file_id);
        debug!(%file_id, name, "file opened");
        Ok(file_id)
    }

    /// Close a file, flushing its dirty pages first if `flush` is set,
    /// discarding them otherwise.
    ///
    /// Fails with [`Error::PageInUse`] while any page of the file is still
    /// pinned: dropping a pinned page would strand the holder's reference
    /// outside both caches.
    pub fn close_file(&self, file_id: FileId, flush: bool) -> Result<()> {
        self.ensure_registered(file_id)?;

        self.purge_read_cache(file_id)?;
        if flush {
            self.write_cache.flush_file(file_id)?;
        } else {
            for entry in self.write_cache.discard_file(file_id)? {
                self.release_entry(&entry);
            }
        }

        let mut state = self.state.lock();
        state.file_pages.remove(&file_id);
        if let Some(name) = state.names.remove(&file_id) {
            state.ids_by_name.remove(&name);
        }
        drop(state);

        self.files.remove(file_id);
        debug!(%file_id, flush, "file closed");
        Ok(())
    }

    /// Delete a file: truncate (purging both caches), then drop it from
    /// the table and from disk.
    pub fn delete_file(&self, file_id: FileId) -> Result<()> {
        self.truncate_file(file_id)?;

        let mut state = self.state.lock();
        state.file_pages.remove(&file_id);
        if let Some(name) = state.names.remove(&file_id) {
            state.ids_by_name.remove(&name);
        }
        drop(state);

        let slot = self
            .files
            .remove(file_id)
            .ok_or(Error::FileNotRegistered(file_id))?;
        match Arc::try_unwrap(slot) {
            Ok(mutex) => mutex.into_inner().delete()?,
            Err(slot) => {
                // Someone still holds the slot; unlink by path, the open
                // descriptor dies with the last holder.
                let name = slot.lock().name();
                drop(slot);
                std::fs::remove_file(self.root.join(name))?;
            }
        }
        debug!(%file_id, "file deleted");
        Ok(())
    }

    /// Drop every cached page of a file and shrink it to zero bytes.
    ///
    /// Fails with [`Error::PageInUse`] while any page of the file is still
    /// pinned, before anything is dropped.
    pub fn truncate_file(&self, file_id: FileId) -> Result<()> {
        let slot = self
            .files
            .get(file_id)
            .ok_or(Error::FileNotRegistered(file_id))?;

        self.purge_read_cache(file_id)?;
        for entry in self.write_cache.discard_file(file_id)? {
            self.release_entry(&entry);
        }
        slot.lock().shrink(0)?;
        debug!(%file_id, "file truncated");
        Ok(())
    }

    /// Rename an open file on disk. `old_name` must match the registered
    /// name.
    pub fn rename_file(&self, file_id: FileId, old_name: &str, new_name: &str) -> Result<()> {
        let slot = self
            .files
            .get(file_id)
            .ok_or(Error::FileNotRegistered(file_id))?;

        let mut state = self.state.lock();
        if state.names.get(&file_id).map(String::as_str) != Some(old_name) {
            return Err(Error::FileNotRegistered(file_id));
        }
        slot.lock().rename_to(self.root.join(new_name))?;
        state.names.insert(file_id, new_name.to_owned());
        state.ids_by_name.remove(old_name);
        state.ids_by_name.insert(new_name.to_owned(), file_id);
        debug!(%file_id, old_name, new_name, "file renamed");
        Ok(())
    }

    /// Number of pages the file's meaningful bytes span.
    pub fn filled_up_to(&self, file_id: FileId) -> Result<u64> {
        let slot = self
            .files
            .get(file_id)
            .ok_or(Error::FileNotRegistered(file_id))?;
        let bytes = slot.lock().filled_up_to();
        Ok(bytes.div_ceil(self.page_size as u64))
    }

    // ========================================================================
    // Page access
    // ========================================================================

    /// Load a page, pin it, and hand out a handle to its resident buffer.
    ///
    /// Read-through: a miss populates the read cache from the write cache
    /// or from the raw file (zeroes past the end of the file).
    pub fn load(&self, file_id: FileId, page_index: u64) -> Result<PageHandle> {
        let key = PageKey::new(file_id, page_index);

        // Fast path: resident in the read cache.
        {
            let mut state = self.state.lock();
            if let Some(entry) = state.read_cache.hit(key) {
                entry.pin();
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(self.handle(entry));
            }
        }
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        // Slow path: serialize with flushes and other loads of this page,
        // then fetch without the coarse lock.
        let guard = self.page_locks.write(key);

        {
            let mut state = self.state.lock();
            if let Some(entry) = state.read_cache.hit(key) {
                entry.pin();
                return Ok(self.handle(entry));
            }
        }

        let entry = match self.write_cache.get(key) {
            Some(entry) => entry,
            None => Arc::new(self.fetch(key)?),
        };

        let mut state = self.state.lock();
        let CacheState {
            read_cache,
            file_pages,
            ..
        } = &mut *state;
        let resident = match read_cache.admit(Arc::clone(&entry), file_pages) {
            Ok(load) => load.into_entry(),
            Err(err) => {
                drop(state);
                self.release_entry(&entry);
                return Err(err);
            }
        };
        resident.pin();
        drop(state);
        drop(guard);
        Ok(self.handle(resident))
    }

    /// Unpin a page previously returned by [`Self::load`].
    ///
    /// Fails with [`Error::NotPinned`] if the page is unknown or its pin
    /// count is already zero - silently succeeding would mask a
    /// double-release.
    pub fn release(&self, file_id: FileId, page_index: u64) -> Result<()> {
        let key = PageKey::new(file_id, page_index);
        let entry = {
            let state = self.state.lock();
            state.read_cache.peek(key).cloned()
        };
        let entry = match entry.or_else(|| self.write_cache.get(key)) {
            Some(entry) => entry,
            None => return Err(Error::NotPinned(file_id, page_index)),
        };
        entry.unpin()?;
        Ok(())
    }

    /// Register a page as modified so the write-back cache flushes it.
    pub fn mark_dirty(&self, file_id: FileId, page_index: u64) -> Result<()> {
        self.ensure_registered(file_id)?;
        let key = PageKey::new(file_id, page_index);

        // Resident pages share their entry with the write cache.
        if let Some(entry) = self.peek_read(key) {
            return self.write_cache.mark_dirty_entry(&entry);
        }

        // Serialize with a concurrent load, which would otherwise create
        // a second buffer for the same page.
        let _guard = self.page_locks.write(key);
        if let Some(entry) = self.peek_read(key) {
            return self.write_cache.mark_dirty_entry(&entry);
        }
        self.write_cache.mark_dirty(key)?;
        Ok(())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Flush every dirty page of one file and sync it.
    pub fn flush_file(&self, file_id: FileId) -> Result<()> {
        self.ensure_registered(file_id)?;
        self.write_cache.flush_file(file_id)
    }

    /// Flush every dirty page of every open file.
    pub fn flush_all(&self) -> Result<()> {
        for file_id in self.files.ids() {
            self.write_cache.flush_file(file_id)?;
        }
        Ok(())
    }

    /// Flush everything, then drop all clean pages from the read cache.
    /// Files stay open.
    pub fn clear(&self) -> Result<()> {
        self.flush_all()?;

        let mut state = self.state.lock();
        let drained = state.read_cache.drain_data();
        for pages in state.file_pages.values_mut() {
            pages.clear();
        }
        drop(state);

        for entry in drained {
            self.release_entry(&entry);
        }
        Ok(())
    }

    /// Shut down: stop the background flusher, flush everything, drop all
    /// cached pages and close every file.
    pub fn close(&self) -> Result<()> {
        if let Some(mut flusher) = self.flusher.lock().take() {
            flusher.stop();
        }
        self.flush_all()?;

        let mut state = self.state.lock();
        let drained = state.read_cache.drain_data();
        state.file_pages.clear();
        state.names.clear();
        state.ids_by_name.clear();
        drop(state);

        for entry in drained {
            self.release_entry(&entry);
        }
        for file_id in self.files.ids() {
            self.files.remove(file_id);
        }
        debug!("disk cache closed");
        Ok(())
    }

    /// Diagnostic scan: flush, then re-read every page of every open file
    /// and verify magic number and checksum, reporting each mismatch
    /// without halting.
    pub fn check_pages(&self) -> Result<Vec<PageVerificationError>> {
        self.flush_all()?;

        let mut errors = Vec::new();
        for file_id in self.files.ids() {
            let Some(slot) = self.files.get(file_id) else {
                continue;
            };
            let mut file = slot.lock();
            let file_name = file.name();
            let page_count = file.filled_up_to() / self.page_size as u64;

            let mut page = vec![0u8; self.page_size];
            for page_index in 0..page_count {
                file.read(page_index * self.page_size as u64, &mut page)?;
                let check = page_format::verify(&page);
                if !check.magic_ok {
                    errors.push(PageVerificationError {
                        file_name: file_name.clone(),
                        file_id,
                        page_index,
                        failure: PageCheckFailure::MagicMismatch,
                    });
                }
                if !check.checksum_ok {
                    errors.push(PageVerificationError {
                        file_name: file_name.clone(),
                        file_id,
                        page_index,
                        failure: PageCheckFailure::ChecksumMismatch,
                    });
                }
            }
        }
        Ok(errors)
    }

    /// Record the dirty-page tables of all files in the write-ahead log.
    pub fn log_dirty_pages_table(&self) -> Result<()> {
        self.write_cache.log_dirty_pages_table()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_registered(&self, file_id: FileId) -> Result<()> {
        if self.files.contains(file_id) {
            Ok(())
        } else {
            Err(Error::FileNotRegistered(file_id))
        }
    }

    fn peek_read(&self, key: PageKey) -> Option<Arc<CacheEntry>> {
        self.state.lock().read_cache.peek(key).cloned()
    }

    fn handle(&self, entry: Arc<CacheEntry>) -> PageHandle {
        PageHandle {
            entry,
            memory: Arc::clone(&self.memory),
            page_size: self.page_size,
        }
    }

    /// Read a page from its raw file into a fresh buffer; zeroes if the
    /// page lies past the end of the file.
    fn fetch(&self, key: PageKey) -> Result<CacheEntry> {
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
        Ok(CacheEntry::new(key, lsn, handle))
    }

    /// Remove all of a file's pages from the read cache, freeing buffers
    /// the write cache does not claim.
    ///
    /// Fails with [`Error::PageInUse`] if any of them is pinned, before
    /// removing anything. Pins are only taken under the same coarse lock,
    /// so the check and the removal are atomic.
    fn purge_read_cache(&self, file_id: FileId) -> Result<()> {
        let mut state = self.state.lock();
        let pages: Vec<u64> = state
            .file_pages
            .get(&file_id)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();

        for &page_index in &pages {
            if let Some(entry) = state.read_cache.peek(PageKey::new(file_id, page_index)) {
                if entry.is_pinned() {
                    return Err(Error::PageInUse(file_id, page_index));
                }
            }
        }

        if let Some(known) = state.file_pages.get_mut(&file_id) {
            known.clear();
        }
        let mut removed = Vec::new();
        for page_index in pages {
            if let Some(entry) = state.read_cache.remove(PageKey::new(file_id, page_index)) {
                removed.push(entry);
            }
        }
        drop(state);

        for entry in removed {
            self.release_entry(&entry);
        }
        Ok(())
    }

    /// Free an entry's buffer once nothing claims it: both residency
    /// flags off and pin count zero.
    fn release_entry(&self, entry: &CacheEntry) {
        if !entry.in_read_cache() && !entry.in_write_cache() && !entry.is_pinned() {
            if let Some(handle) = entry.take_buffer() {
                self.memory.free(handle);
            }
            self.page_locks.release(entry.key());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_config() -> CacheConfig {
        CacheConfig {
            max_memory: 4 * 512,
            page_size: 512,
            write_cache_capacity: Some(8),
            ..CacheConfig::default()
        }
    }

    #[test]
    fn test_open_file_is_idempotent_per_name() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();

        let a = cache.open_file("data.tst").unwrap();
        let b = cache.open_file("data.tst").unwrap();
        let c = cache.open_file("other.tst").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        cache.close().unwrap();
    }

    #[test]
    fn test_load_unknown_file_fails() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();

        let err = cache.load(FileId::new(7), 0).unwrap_err();
        assert!(matches!(err, Error::FileNotRegistered(_)));
        cache.close().unwrap();
    }

    #[test]
    fn test_load_release_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        let page = cache.load(fid, 0).unwrap();
        page.write(100, b"hello");

        let mut buf = [0u8; 5];
        page.read(100, &mut buf);
        assert_eq!(&buf, b"hello");

        cache.release(fid, 0).unwrap();
        cache.close().unwrap();
    }

    #[test]
    fn test_release_never_pinned_fails() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        let err = cache.release(fid, 3).unwrap_err();
        assert!(matches!(err, Error::NotPinned(_, 3)));
        cache.close().unwrap();
    }

    #[test]
    fn test_second_load_hits_the_read_cache() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        cache.load(fid, 0).unwrap();
        cache.release(fid, 0).unwrap();
        cache.load(fid, 0).unwrap();
        cache.release(fid, 0).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        cache.close().unwrap();
    }

    #[test]
    fn test_rename_keeps_content() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("old.tst").unwrap();

        let page = cache.load(fid, 0).unwrap();
        page.write(64, &[9u8; 8]);
        cache.mark_dirty(fid, 0).unwrap();
        cache.release(fid, 0).unwrap();

        cache.rename_file(fid, "old.tst", "new.tst").unwrap();
        cache.flush_file(fid).unwrap();
        assert!(dir.path().join("new.tst").exists());
        assert!(!dir.path().join("old.tst").exists());
        cache.close().unwrap();
    }

    #[test]
    fn test_truncate_purges_both_caches() {
        let dir = tempdir().unwrap();
        let memory = Arc::new(DirectMemory::new());
        let cache = DiskCache::with_log(
            dir.path(),
            small_config(),
            Arc::new(NoopLog),
            Arc::clone(&memory),
        )
        .unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        cache.load(fid, 0).unwrap();
        cache.release(fid, 0).unwrap();
        cache.mark_dirty(fid, 1).unwrap();

        cache.truncate_file(fid).unwrap();
        assert_eq!(cache.filled_up_to(fid).unwrap(), 0);
        assert_eq!(memory.allocated(), 0);
        cache.close().unwrap();
    }

    #[test]
    fn test_truncate_with_pinned_page_fails_then_succeeds() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        cache.load(fid, 0).unwrap();
        let err = cache.truncate_file(fid).unwrap_err();
        assert!(matches!(err, Error::PageInUse(_, 0)));

        // The pinned page stayed resident, so release still balances.
        cache.release(fid, 0).unwrap();
        cache.truncate_file(fid).unwrap();
        assert_eq!(cache.filled_up_to(fid).unwrap(), 0);
        cache.close().unwrap();
    }

    #[test]
    fn test_close_file_with_pinned_page_fails() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        cache.load(fid, 2).unwrap();
        let err = cache.close_file(fid, false).unwrap_err();
        assert!(matches!(err, Error::PageInUse(_, 2)));

        cache.release(fid, 2).unwrap();
        cache.close_file(fid, false).unwrap();
        cache.close().unwrap();
    }

    #[test]
    fn test_close_file_without_flush_discards_dirty_pages() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        cache.mark_dirty(fid, 0).unwrap();
        cache.close_file(fid, false).unwrap();

        let fid = cache.open_file("data.tst").unwrap();
        assert_eq!(cache.filled_up_to(fid).unwrap(), 0);
        cache.close().unwrap();
    }

    #[test]
    #[should_panic(expected = "outside page")]
    fn test_page_handle_rejects_out_of_page_range() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        let page = cache.load(fid, 0).unwrap();
        let mut buf = [0u8; 8];
        // Page size is 512; this range runs past the end.
        page.read(510, &mut buf);
    }

    #[test]
    fn test_check_pages_reports_corruption() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();

        cache.mark_dirty(fid, 0).unwrap();
        cache.flush_file(fid).unwrap();
        assert!(cache.check_pages().unwrap().is_empty());
        cache.close().unwrap();

        // Corrupt one payload byte behind the cache's back.
        let path = dir.path().join("data.tst");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[200] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let cache = DiskCache::open(dir.path(), small_config()).unwrap();
        let fid = cache.open_file("data.tst").unwrap();
        let errors = cache.check_pages().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file_id, fid);
        assert_eq!(errors[0].page_index, 0);
        assert_eq!(errors[0].failure, PageCheckFailure::ChecksumMismatch);
        cache.close().unwrap();
    }
}
