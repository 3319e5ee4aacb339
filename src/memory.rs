//! Direct memory allocator for resident page content.
//!
//! The cache keeps page bytes outside of the cache entries themselves, in
//! buffers owned by a [`DirectMemory`] allocator and addressed through
//! opaque [`BufferHandle`]s. A handle is move-only: it cannot be copied,
//! so a buffer can be freed exactly once, and the borrow checker rules out
//! use-after-free through a handle that was passed to [`DirectMemory::free`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Opaque handle to one allocated page buffer.
///
/// Deliberately neither `Clone` nor `Copy`. Whoever holds the handle owns
/// the buffer; freeing consumes the handle.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    /// Raw allocator id, for diagnostics only.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Allocator of fixed-size page buffers.
///
/// Stands in for the engine-wide off-heap allocator: the cache only
/// consumes the allocate/free/read/write surface. All operations are
/// thread-safe; the internal map is guarded by a mutex with short
/// critical sections (byte copies happen while holding it, which is fine
/// for page-sized buffers).
pub struct DirectMemory {
    buffers: Mutex<HashMap<u64, Box<[u8]>>>,
    next_id: AtomicU64,
}

impl DirectMemory {
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a buffer initialized with `content`.
    pub fn allocate(&self, content: Vec<u8>) -> BufferHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().insert(id, content.into_boxed_slice());
        BufferHandle(id)
    }

    /// Free a buffer. Consumes the handle.
    pub fn free(&self, handle: BufferHandle) {
        let freed = self.buffers.lock().remove(&handle.0);
        assert!(freed.is_some(), "buffer {} freed twice", handle.0);
    }

    /// Read a byte range of a buffer into `buf`.
    ///
    /// # Panics
    /// Panics if the handle is stale or the range exceeds the buffer.
    pub fn read(&self, handle: &BufferHandle, offset: usize, buf: &mut [u8]) {
        let buffers = self.buffers.lock();
        let data = Self::resolve(&buffers, handle);
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
    }

    /// Write `bytes` into a byte range of a buffer.
    ///
    /// # Panics
    /// Panics if the handle is stale or the range exceeds the buffer.
    pub fn write(&self, handle: &BufferHandle, offset: usize, bytes: &[u8]) {
        let mut buffers = self.buffers.lock();
        let data = buffers
            .get_mut(&handle.0)
            .unwrap_or_else(|| panic!("buffer {} is not allocated", handle.0));
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Copy the whole buffer out.
    pub fn copy_out(&self, handle: &BufferHandle) -> Vec<u8> {
        let buffers = self.buffers.lock();
        Self::resolve(&buffers, handle).to_vec()
    }

    /// Number of currently allocated buffers.
    pub fn allocated(&self) -> usize {
        self.buffers.lock().len()
    }

    fn resolve<'a>(buffers: &'a HashMap<u64, Box<[u8]>>, handle: &BufferHandle) -> &'a [u8] {
        buffers
            .get(&handle.0)
            .unwrap_or_else(|| panic!("buffer {} is not allocated", handle.0))
    }
}

impl Default for DirectMemory {
    fn default() -> Self {
        Self::new()
    }
}
