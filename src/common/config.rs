//! Cache configuration.

use std::time::Duration;

/// Default size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems and the common database page
/// granule. Page size is configurable per cache instance; this is only the
/// default.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default span of a write group in pages.
///
/// Dirty pages whose indices fall in the same aligned run of this many
/// pages are flushed together as one batched write.
pub const DEFAULT_WRITE_GROUP_SPAN: u64 = 16;

/// Default interval between background flush passes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

/// Runtime configuration of the disk cache.
///
/// # Example
/// ```
/// use duocache::common::CacheConfig;
///
/// let config = CacheConfig {
///     max_memory: 4 * 1024 * 1024, // 4MB of resident pages
///     ..CacheConfig::default()
/// };
/// assert_eq!(config.max_pages(), 1024);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum memory for resident page content, in bytes.
    ///
    /// Converted to a page count bound on the read cache.
    pub max_memory: usize,

    /// Size of a page in bytes.
    pub page_size: usize,

    /// Number of contiguous page indices grouped into one batched flush.
    pub write_group_span: u64,

    /// Interval between background flush passes.
    pub flush_interval: Duration,

    /// Call file-level sync after every flushed write group.
    pub sync_on_page_flush: bool,

    /// Grow the read cache instead of failing when every eviction
    /// candidate is pinned.
    pub grow_on_exhaustion: bool,

    /// Fractional growth step applied when growing on exhaustion
    /// (0.1 grows the bound by 10%).
    pub growth_step: f64,

    /// Capacity of the write-back cache in pages.
    ///
    /// `None` uses the read-cache page count.
    pub write_cache_capacity: Option<usize>,
}

impl CacheConfig {
    /// Read-cache capacity bound in pages.
    ///
    /// Never below 4 pages, so the 2Q queue bounds (a quarter and a half
    /// of capacity) stay meaningful.
    pub fn max_pages(&self) -> usize {
        (self.max_memory / self.page_size).max(4)
    }

    /// Write-cache capacity bound in pages.
    pub fn write_cache_pages(&self) -> usize {
        self.write_cache_capacity.unwrap_or_else(|| self.max_pages())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory: 64 * 1024 * 1024,
            page_size: DEFAULT_PAGE_SIZE,
            write_group_span: DEFAULT_WRITE_GROUP_SPAN,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            sync_on_page_flush: false,
            grow_on_exhaustion: false,
            growth_step: 0.1,
            write_cache_capacity: None,
        }
    }
}
