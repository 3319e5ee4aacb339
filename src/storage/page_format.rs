//! On-disk page format: magic number, checksum and the page LSN field.
//!
//! # Layout
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       8     magic number (little-endian u64 constant)
//! 8       4     CRC32 of bytes [12, page_size) (little-endian)
//! 12      8     LSN of the last mutation (little-endian, part of payload)
//! 20      ...   payload
//! ```
//!
//! The magic number and checksum are stamped by the flush path just before
//! a page goes to disk. The LSN field is maintained by whichever component
//! mutates the page; the cache only reads it to decide how far the
//! write-ahead log must be flushed before the page may be written. The CRC
//! covers the LSN like any other payload byte.

use crate::wal::Lsn;

/// Magic constant stamped at the start of every flushed page.
pub const MAGIC_NUMBER: u64 = 0xFACB_03FE;

/// Offset of the magic number field.
pub const MAGIC_OFFSET: usize = 0;

/// Offset of the CRC32 field.
pub const CRC_OFFSET: usize = 8;

/// Offset of the page LSN field, and start of the checksummed range.
pub const LSN_OFFSET: usize = 12;

/// Bytes reserved for magic + checksum; excluded from the CRC.
pub const SYSTEM_SIZE: usize = LSN_OFFSET;

/// Outcome of verifying one stored page.
///
/// Both checks run independently so a diagnostic scan can report exactly
/// which of the two failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCheck {
    pub magic_ok: bool,
    pub checksum_ok: bool,
}

impl PageCheck {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.magic_ok && self.checksum_ok
    }
}

/// Compute the CRC32 over the checksummed range of a page.
pub fn compute_crc(page: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&page[SYSTEM_SIZE..]);
    hasher.finalize()
}

/// Stamp the magic number and checksum into the page header.
///
/// Called on the flush path after all content mutation is done.
pub fn stamp(page: &mut [u8]) {
    page[MAGIC_OFFSET..MAGIC_OFFSET + 8].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
    let crc = compute_crc(page);
    page[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
}

/// Verify the magic number and checksum of a stored page.
pub fn verify(page: &[u8]) -> PageCheck {
    let mut magic = [0u8; 8];
    magic.copy_from_slice(&page[MAGIC_OFFSET..MAGIC_OFFSET + 8]);

    let mut crc = [0u8; 4];
    crc.copy_from_slice(&page[CRC_OFFSET..CRC_OFFSET + 4]);

    PageCheck {
        magic_ok: u64::from_le_bytes(magic) == MAGIC_NUMBER,
        checksum_ok: u32::from_le_bytes(crc) == compute_crc(page),
    }
}

/// Read the last-mutation LSN stored in the page.
pub fn read_lsn(page: &[u8]) -> Lsn {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&page[LSN_OFFSET..LSN_OFFSET + 8]);
    Lsn(u64::from_le_bytes(bytes))
}

/// Write the last-mutation LSN into the page.
pub fn write_lsn(page: &mut [u8], lsn: Lsn) {
    page[LSN_OFFSET..LSN_OFFSET + 8].copy_from_slice(&lsn.0.to_le_bytes());
}
