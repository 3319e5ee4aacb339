//! DuoCache - the page buffer pool (disk cache) of an embedded storage
//! engine, with 2Q read caching and a write-back cache with grouped,
//! ordered flushing.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           DuoCache                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              DiskCache facade (cache/)                   │   │
//! │  │   open/close/delete/truncate/rename files,               │   │
//! │  │   load(pin) / release / mark_dirty / flush / verify      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                 ↓                          ↓                    │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐   │
//! │  │   Read cache (2Q)        │  │   Write-back cache        │   │
//! │  │   am | a1in | a1out      │  │   ordered dirty map,      │   │
//! │  │   scan-resistant         │  │   write groups, rotating  │   │
//! │  │   eviction               │  │   flush pointers, WAL     │   │
//! │  │                          │  │   ordering + Flusher      │   │
//! │  └──────────────────────────┘  └──────────────────────────┘   │
//! │                 ↓                          ↓                    │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage layer (storage/)                       │   │
//! │  │   RawFile + FileTable + page format (magic/CRC32/LSN)    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                                                                 │
//! │  Collaborators: DirectMemory allocator (memory),                │
//! │                 WriteAheadLog contract (wal)                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (FileId, PageKey, Error, config)
//! - [`cache`] - Read cache, write-back cache, facade
//! - [`storage`] - Raw file I/O and the on-disk page format
//! - [`memory`] - Direct memory allocator collaborator
//! - [`wal`] - Write-ahead log contract
//!
//! # Quick Start
//! ```no_run
//! use duocache::{CacheConfig, DiskCache};
//!
//! let cache = DiskCache::open("./data", CacheConfig::default()).unwrap();
//! let file_id = cache.open_file("records.dat").unwrap();
//!
//! let page = cache.load(file_id, 0).unwrap();
//! page.write(64, b"payload");
//! cache.mark_dirty(file_id, 0).unwrap();
//! cache.release(file_id, 0).unwrap();
//!
//! cache.flush_file(file_id).unwrap();
//! cache.close().unwrap();
//! ```

pub mod cache;
pub mod common;
pub mod memory;
pub mod storage;
pub mod wal;

// Re-export commonly used items at crate root for convenience
pub use cache::{
    CacheStats, DiskCache, PageCheckFailure, PageHandle, PageVerificationError, StatsSnapshot,
};
pub use common::{CacheConfig, Error, FileId, PageKey, Result};
pub use memory::{BufferHandle, DirectMemory};
pub use storage::RawFile;
pub use wal::{DirtyPage, Lsn, NoopLog, WriteAheadLog};
