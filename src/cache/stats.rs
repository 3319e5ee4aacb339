//! Cache statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics tracked by the disk cache.
///
/// All fields are atomic for lock-free, thread-safe updates; counters are
/// eventually consistent and use `Ordering::Relaxed` throughout.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Loads served from the read cache.
    pub cache_hits: AtomicU64,

    /// Loads that had to go to the write cache or the raw file.
    pub cache_misses: AtomicU64,

    /// Pages evicted from the read cache.
    pub evictions: AtomicU64,

    /// Pages physically written by the flush path.
    pub pages_written: AtomicU64,

    /// Write groups skipped because a member was recently touched.
    pub groups_deferred: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    /// Get a non-atomic snapshot for display or comparison.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
            groups_deferred: self.groups_deferred.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub pages_written: u64,
    pub groups_deferred: u64,
}

impl StatsSnapshot {
    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, evictions: {}, written: {}, hit_rate: {:.2}% }}",
            self.cache_hits,
            self.cache_misses,
            self.evictions,
            self.pages_written,
            self.hit_rate() * 100.0
        )
    }
}
