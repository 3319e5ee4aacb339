//! File identifier type.

use std::fmt;

/// Identifies a flat file registered in the disk cache.
///
/// File ids are assigned by the cache facade when a file is opened and
/// stay stable until the file is deleted or the cache is closed. Using a
/// newtype keeps them from being confused with page indices in signatures
/// that carry both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u64);

impl FileId {
    /// Create a new FileId.
    #[inline]
    pub fn new(id: u64) -> Self {
        FileId(id)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File({})", self.0)
    }
}
