//! Storage layer - raw file I/O and the on-disk page format.
//!
//! - [`RawFile`] - byte-offset I/O on one flat file
//! - [`FileTable`] - shared registry of open files
//! - [`page_format`] - magic number, CRC32 and page LSN layout

mod file_table;
pub mod page_format;
mod raw_file;

pub use file_table::{FileSlot, FileTable};
pub use raw_file::RawFile;
