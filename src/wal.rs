//! Write-ahead log contract.
//!
//! The cache does not implement a log; it only requires the durability
//! ordering surface: monotonically comparable sequence numbers, a way to
//! force the log to disk up to the present, and a sink for the dirty-page
//! table used by crash recovery. No page is physically written before the
//! log has been flushed past that page's recorded sequence number.

use std::fmt;

use crate::common::Result;

/// Log sequence number: a monotonic position in the write-ahead log.
///
/// Total order matches log order, so "the log is durable up to `lsn`" is
/// expressed as `flushed_lsn() >= Some(lsn)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lsn({})", self.0)
    }
}

/// One record of the dirty-page table handed to the log for recovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirtyPage {
    /// File name, stable across restarts (unlike file ids).
    pub file_name: String,
    pub page_index: u64,
    /// Sequence number recorded when the page was first marked dirty.
    pub lsn: Lsn,
}

/// Durability contract the cache requires from a log component.
pub trait WriteAheadLog: Send + Sync {
    /// Highest sequence number known to be durable, or `None` if nothing
    /// has been flushed yet.
    fn flushed_lsn(&self) -> Option<Lsn>;

    /// Force the log to disk up to its current end.
    fn flush(&self) -> Result<()>;

    /// Record the dirty-page table for recovery.
    fn log_dirty_pages(&self, pages: Vec<DirtyPage>) -> Result<()>;
}

/// Log stub for configurations that run without a durability log.
///
/// Reports everything as flushed, so page writes never wait.
pub struct NoopLog;

impl WriteAheadLog for NoopLog {
    fn flushed_lsn(&self) -> Option<Lsn> {
        Some(Lsn(u64::MAX))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn log_dirty_pages(&self, _pages: Vec<DirtyPage>) -> Result<()> {
        Ok(())
    }
}
