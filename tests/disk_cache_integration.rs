//! Integration tests for the disk cache facade.
//!
//! These tests verify cross-component behavior that unit tests don't cover:
//! eviction pressure against dirty pages, flush scenarios end to end, and
//! persistence across cache instances.

use std::sync::Arc;
use std::thread;

use duocache::storage::page_format;
use duocache::{CacheConfig, DirectMemory, DiskCache, Error, FileId, NoopLog};
use tempfile::tempdir;

const PAGE_SIZE: usize = 512;

fn config(read_pages: usize) -> CacheConfig {
    CacheConfig {
        max_memory: read_pages * PAGE_SIZE,
        page_size: PAGE_SIZE,
        write_cache_capacity: Some(16),
        ..CacheConfig::default()
    }
}

fn create_cache(
    root: &std::path::Path,
    read_pages: usize,
) -> (DiskCache, Arc<DirectMemory>) {
    let memory = Arc::new(DirectMemory::new());
    let cache =
        DiskCache::with_log(root, config(read_pages), Arc::new(NoopLog), Arc::clone(&memory))
            .unwrap();
    (cache, memory)
}

/// Write a recognizable payload into a pinned page and mark it dirty.
fn dirty_page(cache: &DiskCache, fid: FileId, page_index: u64, marker: u8) {
    let page = cache.load(fid, page_index).unwrap();
    page.write(100, &[marker; 16]);
    cache.mark_dirty(fid, page_index).unwrap();
    cache.release(fid, page_index).unwrap();
}

/// Mark pages 0-3 dirty, flush, and verify the on-disk result.
#[test]
fn test_flush_file_writes_stamped_pages() {
    let dir = tempdir().unwrap();
    let (cache, _memory) = create_cache(dir.path(), 8);
    let fid = cache.open_file("data.tst").unwrap();

    for i in 0..4 {
        dirty_page(&cache, fid, i, i as u8 + 1);
    }
    cache.flush_file(fid).unwrap();

    assert_eq!(cache.filled_up_to(fid).unwrap(), 4);
    assert_eq!(cache.stats().pages_written, 4);

    // Every page on disk carries a valid magic number and checksum.
    let bytes = std::fs::read(dir.path().join("data.tst")).unwrap();
    assert_eq!(bytes.len(), 4 * PAGE_SIZE);
    for i in 0..4 {
        let page = &bytes[i * PAGE_SIZE..(i + 1) * PAGE_SIZE];
        assert!(page_format::verify(page).is_ok());
        assert_eq!(page[100], i as u8 + 1);
    }

    cache.close().unwrap();
}

/// A second flush with no intervening mutation writes nothing.
#[test]
fn test_flush_file_is_idempotent() {
    let dir = tempdir().unwrap();
    let (cache, _memory) = create_cache(dir.path(), 8);
    let fid = cache.open_file("data.tst").unwrap();

    for i in 0..4 {
        dirty_page(&cache, fid, i, 0xAA);
    }
    cache.flush_file(fid).unwrap();
    let written = cache.stats().pages_written;

    cache.flush_file(fid).unwrap();
    assert_eq!(cache.stats().pages_written, written);
    assert_eq!(cache.filled_up_to(fid).unwrap(), 4);

    cache.close().unwrap();
}

/// Capacity 4, five distinct loads: exactly one eviction, and the resident
/// set never exceeds the bound.
#[test]
fn test_load_five_pages_into_capacity_four() {
    let dir = tempdir().unwrap();
    let (cache, memory) = create_cache(dir.path(), 4);
    let fid = cache.open_file("data.tst").unwrap();

    for i in 0..5 {
        cache.load(fid, i).unwrap();
        cache.release(fid, i).unwrap();
        assert!(memory.allocated() <= 4);
    }
    assert_eq!(cache.stats().evictions, 1);

    cache.close().unwrap();
    assert_eq!(memory.allocated(), 0);
}

/// A dirty page evicted from the read cache keeps its buffer alive until
/// the write cache flushes it.
#[test]
fn test_evicted_dirty_page_retains_buffer() {
    let dir = tempdir().unwrap();
    let (cache, memory) = create_cache(dir.path(), 4);
    let fid = cache.open_file("data.tst").unwrap();

    dirty_page(&cache, fid, 0, 0x42);

    // Four more loads push page 0 out of the read cache.
    for i in 1..=4 {
        cache.load(fid, i).unwrap();
        cache.release(fid, i).unwrap();
    }
    assert_eq!(cache.stats().evictions, 1);
    // Four resident pages plus the evicted-but-dirty page 0.
    assert_eq!(memory.allocated(), 5);

    cache.flush_all().unwrap();
    assert_eq!(memory.allocated(), 4);

    // The write survived the eviction.
    let page = cache.load(fid, 0).unwrap();
    let mut buf = [0u8; 16];
    page.read(100, &mut buf);
    assert_eq!(buf, [0x42; 16]);
    cache.release(fid, 0).unwrap();

    cache.close().unwrap();
}

/// Releasing a never-pinned page fails loudly and changes nothing.
#[test]
fn test_release_without_pin_fails() {
    let dir = tempdir().unwrap();
    let (cache, _memory) = create_cache(dir.path(), 4);
    let fid = cache.open_file("data.tst").unwrap();

    let err = cache.release(fid, 0).unwrap_err();
    assert!(matches!(err, Error::NotPinned(_, 0)));

    // Balanced pin/unpin still works afterwards.
    cache.load(fid, 0).unwrap();
    cache.release(fid, 0).unwrap();
    let err = cache.release(fid, 0).unwrap_err();
    assert!(matches!(err, Error::NotPinned(_, 0)));

    cache.close().unwrap();
}

/// Flushed content is visible to a later cache instance.
#[test]
fn test_persistence_across_sessions() {
    let dir = tempdir().unwrap();

    {
        let (cache, _memory) = create_cache(dir.path(), 8);
        let fid = cache.open_file("data.tst").unwrap();
        for i in 0..3 {
            dirty_page(&cache, fid, i, 0x10 + i as u8);
        }
        cache.close().unwrap();
    }

    let (cache, _memory) = create_cache(dir.path(), 8);
    let fid = cache.open_file("data.tst").unwrap();
    assert_eq!(cache.filled_up_to(fid).unwrap(), 3);
    for i in 0..3 {
        let page = cache.load(fid, i).unwrap();
        let mut buf = [0u8; 1];
        page.read(100, &mut buf);
        assert_eq!(buf[0], 0x10 + i as u8);
        cache.release(fid, i).unwrap();
    }
    assert!(cache.check_pages().unwrap().is_empty());
    cache.close().unwrap();
}

/// flush_all covers every open file.
#[test]
fn test_flush_all_spans_files() {
    let dir = tempdir().unwrap();
    let (cache, _memory) = create_cache(dir.path(), 8);

    let a = cache.open_file("a.tst").unwrap();
    let b = cache.open_file("b.tst").unwrap();
    dirty_page(&cache, a, 0, 1);
    dirty_page(&cache, b, 2, 2);

    cache.flush_all().unwrap();
    assert_eq!(cache.filled_up_to(a).unwrap(), 1);
    assert_eq!(cache.filled_up_to(b).unwrap(), 3);

    cache.close().unwrap();
}

/// Deleting a file drops its pages, its bookkeeping and the file itself.
#[test]
fn test_delete_file_removes_everything() {
    let dir = tempdir().unwrap();
    let (cache, memory) = create_cache(dir.path(), 8);
    let fid = cache.open_file("doomed.tst").unwrap();

    dirty_page(&cache, fid, 0, 0x99);
    cache.delete_file(fid).unwrap();

    assert!(!dir.path().join("doomed.tst").exists());
    assert_eq!(memory.allocated(), 0);
    assert!(matches!(
        cache.load(fid, 0).unwrap_err(),
        Error::FileNotRegistered(_)
    ));

    cache.close().unwrap();
}

/// Concurrent loads and releases across threads stay balanced.
#[test]
fn test_concurrent_load_release() {
    let dir = tempdir().unwrap();
    let (cache, memory) = create_cache(dir.path(), 8);
    let cache = Arc::new(cache);
    let fid = cache.open_file("data.tst").unwrap();

    let mut handles = vec![];
    for t in 0..4u64 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for round in 0..50 {
                let page_index = (t + round) % 6;
                cache.load(fid, page_index).unwrap();
                cache.release(fid, page_index).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.cache_hits + stats.cache_misses, 4 * 50);

    cache.close().unwrap();
    assert_eq!(memory.allocated(), 0);
}
