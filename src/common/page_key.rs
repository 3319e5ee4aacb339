//! Composite page identity with a total order.

use std::fmt;

use crate::common::FileId;

/// Identifies one page of one file.
///
/// The derived ordering is lexicographic: first by file id, then by page
/// index. That single order serves three purposes:
/// - lookup key for both caches,
/// - key of the write-back `BTreeMap`, where range scans discover
///   contiguous write groups,
/// - flush order within a write group, preserving on-disk locality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageKey {
    pub file_id: FileId,
    pub page_index: u64,
}

impl PageKey {
    /// Create a new PageKey.
    #[inline]
    pub fn new(file_id: FileId, page_index: u64) -> Self {
        Self {
            file_id,
            page_index,
        }
    }

    /// First page index of the write group containing this page.
    #[inline]
    pub fn group_start(&self, span: u64) -> u64 {
        (self.page_index / span) * span
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.file_id, self.page_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_file_first() {
        let a = PageKey::new(FileId::new(1), 100);
        let b = PageKey::new(FileId::new(2), 0);
        assert!(a < b);
    }

    #[test]
    fn test_order_page_index_second() {
        let a = PageKey::new(FileId::new(1), 3);
        let b = PageKey::new(FileId::new(1), 4);
        assert!(a < b);
    }

    #[test]
    fn test_group_start() {
        let key = PageKey::new(FileId::new(1), 37);
        assert_eq!(key.group_start(16), 32);

        let key = PageKey::new(FileId::new(1), 16);
        assert_eq!(key.group_start(16), 16);

        let key = PageKey::new(FileId::new(1), 5);
        assert_eq!(key.group_start(16), 0);
    }
}
