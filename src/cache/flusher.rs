//! Background flush thread.
//!
//! One dedicated thread drives [`WriteCache::background_pass`] on a fixed
//! interval. Shutdown is cooperative: a stop flag under a mutex plus a
//! condvar wake the thread out of its sleep, the in-flight pass finishes,
//! and the thread is joined.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::cache::WriteCache;
use crate::common::Result;

struct FlusherShared {
    stop: Mutex<bool>,
    signal: Condvar,
}

/// Handle to the background flush thread.
///
/// Dropping the handle stops and joins the thread.
pub struct Flusher {
    shared: Arc<FlusherShared>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Spawn the flush thread.
    pub fn start(write_cache: Arc<WriteCache>, interval: Duration) -> Result<Self> {
        let shared = Arc::new(FlusherShared {
            stop: Mutex::new(false),
            signal: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("duocache-flush".into())
            .spawn(move || {
                debug!(?interval, "flush thread started");
                let mut stop = thread_shared.stop.lock();
                loop {
                    if *stop {
                        break;
                    }
                    let _ = thread_shared.signal.wait_for(&mut stop, interval);
                    if *stop {
                        break;
                    }
                    drop(stop);

                    if let Err(err) = write_cache.background_pass() {
                        // I/O trouble in the background keeps pages dirty;
                        // the next pass or an explicit flush retries.
                        warn!(%err, "background flush pass failed");
                    }
                    stop = thread_shared.stop.lock();
                }
                debug!("flush thread stopped");
            })?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to finish. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut stop = self.shared.stop.lock();
            *stop = true;
        }
        self.shared.signal.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStats, PageLockTable};
    use crate::common::{CacheConfig, FileId, PageKey};
    use crate::memory::DirectMemory;
    use crate::storage::{FileTable, RawFile};
    use crate::wal::NoopLog;
    use tempfile::tempdir;

    fn write_cache(dir: &std::path::Path) -> Arc<WriteCache> {
        let files = Arc::new(FileTable::new());
        files.insert(FileId::new(1), RawFile::create(dir.join("f1.tst")).unwrap());
        let config = CacheConfig {
            page_size: 256,
            write_cache_capacity: Some(16),
            ..CacheConfig::default()
        };
        Arc::new(WriteCache::new(
            &config,
            files,
            Arc::new(PageLockTable::new()),
            Arc::new(NoopLog),
            Arc::new(DirectMemory::new()),
            Arc::new(CacheStats::new()),
        ))
    }

    #[test]
    fn test_background_thread_drains_dirty_pages() {
        let dir = tempdir().unwrap();
        let cache = write_cache(dir.path());
        for i in 0..3 {
            cache.mark_dirty(PageKey::new(FileId::new(1), i)).unwrap();
        }

        let mut flusher = Flusher::start(Arc::clone(&cache), Duration::from_millis(10)).unwrap();

        // Two passes are enough: one cools the group, one writes it.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !cache.is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(cache.is_empty());

        flusher.stop();
    }

    #[test]
    fn test_stop_is_idempotent_and_prompt() {
        let dir = tempdir().unwrap();
        let cache = write_cache(dir.path());

        // A long interval must not delay shutdown: the condvar wakes it.
        let mut flusher = Flusher::start(cache, Duration::from_secs(3600)).unwrap();
        flusher.stop();
        flusher.stop();
    }
}
