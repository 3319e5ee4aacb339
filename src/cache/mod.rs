//! Caching layer: 2Q read cache, write-back cache, and the facade that
//! combines them.
//!
//! - [`CacheEntry`] - per-page metadata shared between both caches
//! - [`LruList`] - ordered list backing the 2Q queues
//! - [`TwoQCache`] - read cache with scan-resistant 2Q eviction
//! - [`PageLockTable`] - lazily created per-page locks
//! - [`WriteCache`] - dirty pages, grouped ordered flushing
//! - [`Flusher`] - background flush thread
//! - [`DiskCache`] - the facade the engine talks to

mod disk_cache;
mod entry;
mod flusher;
mod lru_list;
mod page_locks;
mod read_cache;
mod stats;
mod write_cache;

pub use disk_cache::{DiskCache, PageCheckFailure, PageHandle, PageVerificationError};
pub use entry::CacheEntry;
pub use flusher::Flusher;
pub use lru_list::LruList;
pub use page_locks::{PageLockTable, PageWriteGuard};
pub use read_cache::{CacheLoad, TwoQCache};
pub use stats::{CacheStats, StatsSnapshot};
pub use write_cache::{WriteCache, FILL_RATIO_HIGH, FILL_RATIO_LOW};
