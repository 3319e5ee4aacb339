//! Cache entry - per-page metadata record.
//!
//! A [`CacheEntry`] is shared via `Arc` between the read cache and the
//! write-back cache, so both see one pin count and one set of residency
//! flags. While a page is dirty, the write cache's view of the shared
//! entry is authoritative; the buffer is freed exactly once, when neither
//! cache references the entry and the pin count is zero.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{Error, FileId, PageKey, Result};
use crate::memory::BufferHandle;
use crate::wal::Lsn;

/// Per-page metadata: identity, buffer ownership, pin count and
/// residency flags.
///
/// # Thread Safety
/// All fields use interior mutability:
/// - `buffer`: `Mutex` - taken briefly around handle access
/// - `pin_count`: `AtomicU32` - lock-free reference counting
/// - residency flags: `AtomicBool` - read by the flush thread
pub struct CacheEntry {
    key: PageKey,

    /// Log position recorded when the page was loaded.
    loaded_lsn: Lsn,

    /// Owned page buffer; `None` for ghost entries and after the buffer
    /// has been freed.
    buffer: Mutex<Option<BufferHandle>>,

    /// Number of outstanding references handed to callers.
    pin_count: AtomicU32,

    in_read_cache: AtomicBool,
    in_write_cache: AtomicBool,

    /// 2Q/clock bit: set on every mark-dirty, cleared by the flush
    /// scheduler to defer flushing hot write groups.
    recently_touched: AtomicBool,
}

impl CacheEntry {
    /// Create an entry owning page content.
    pub fn new(key: PageKey, loaded_lsn: Lsn, buffer: BufferHandle) -> Self {
        Self {
            key,
            loaded_lsn,
            buffer: Mutex::new(Some(buffer)),
            pin_count: AtomicU32::new(0),
            in_read_cache: AtomicBool::new(false),
            in_write_cache: AtomicBool::new(false),
            recently_touched: AtomicBool::new(true),
        }
    }

    /// Create an identity-only ghost record for the a1out queue.
    pub fn ghost(key: PageKey) -> Self {
        Self {
            key,
            loaded_lsn: Lsn::default(),
            buffer: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            in_read_cache: AtomicBool::new(false),
            in_write_cache: AtomicBool::new(false),
            recently_touched: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn key(&self) -> PageKey {
        self.key
    }

    #[inline]
    pub fn file_id(&self) -> FileId {
        self.key.file_id
    }

    #[inline]
    pub fn page_index(&self) -> u64 {
        self.key.page_index
    }

    #[inline]
    pub fn loaded_lsn(&self) -> Lsn {
        self.loaded_lsn
    }

    // ========================================================================
    // Pin count
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pin count. Returns the new pin count, or
    /// [`Error::NotPinned`] if the count is already zero.
    ///
    /// A silent success here would mask a double-release, so the checked
    /// decrement is the only way down.
    pub fn unpin(&self) -> Result<u32> {
        let mut current = self.pin_count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(Error::NotPinned(self.key.file_id, self.key.page_index));
            }
            match self.pin_count.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current - 1),
                Err(observed) => current = observed,
            }
        }
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    // ========================================================================
    // Residency flags
    // ========================================================================

    #[inline]
    pub fn in_read_cache(&self) -> bool {
        self.in_read_cache.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_in_read_cache(&self, value: bool) {
        self.in_read_cache.store(value, Ordering::Release);
    }

    #[inline]
    pub fn in_write_cache(&self) -> bool {
        self.in_write_cache.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_in_write_cache(&self, value: bool) {
        self.in_write_cache.store(value, Ordering::Release);
    }

    #[inline]
    pub fn recently_touched(&self) -> bool {
        self.recently_touched.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_recently_touched(&self, value: bool) {
        self.recently_touched.store(value, Ordering::Release);
    }

    // ========================================================================
    // Buffer ownership
    // ========================================================================

    /// Whether this entry carries page content.
    pub fn has_buffer(&self) -> bool {
        self.buffer.lock().is_some()
    }

    /// Run `f` against the buffer handle, if the entry still owns one.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&BufferHandle) -> R) -> Option<R> {
        let guard = self.buffer.lock();
        guard.as_ref().map(f)
    }

    /// Take the buffer handle out of the entry, leaving it empty.
    ///
    /// The caller becomes responsible for freeing the handle. Returns
    /// `None` if the entry is a ghost or the buffer was already taken.
    pub fn take_buffer(&self) -> Option<BufferHandle> {
        self.buffer.lock().take()
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("loaded_lsn", &self.loaded_lsn)
            .field("pin_count", &self.pin_count())
            .field("in_read_cache", &self.in_read_cache())
            .field("in_write_cache", &self.in_write_cache())
            .field("recently_touched", &self.recently_touched())
            .field("has_buffer", &self.has_buffer())
            .finish()
    }
}
