//! Raw file abstraction - byte-offset I/O on one flat file.
//!
//! [`RawFile`] is the collaborator surface the cache needs from the file
//! system: positioned read/write, explicit space allocation, a filled-up-to
//! watermark, sync, shrink, delete and rename. Pages are laid out
//! sequentially; page `n` of a file with page size `p` lives at byte
//! offset `n * p`.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::Result;

/// One open flat file with positioned I/O.
///
/// # Thread Safety
/// `RawFile` is single-threaded; callers serialize access (the cache wraps
/// each file in a mutex).
pub struct RawFile {
    file: File,
    path: PathBuf,
    /// Number of meaningful bytes; the file on disk is never shorter.
    filled_up_to: u64,
}

impl RawFile {
    /// Create a new file. Fails if it already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        Ok(Self {
            file,
            path,
            filled_up_to: 0,
        })
    }

    /// Open an existing file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let filled_up_to = file.metadata()?.len();

        Ok(Self {
            file,
            path,
            filled_up_to,
        })
    }

    /// Open an existing file, or create it if absent.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Check for a file without opening it.
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists()
    }

    /// Read `buf.len()` bytes starting at `offset`.
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Write `bytes` at `offset`, advancing the filled watermark if the
    /// write extends past it.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;

        let end = offset + bytes.len() as u64;
        if end > self.filled_up_to {
            self.filled_up_to = end;
        }
        Ok(())
    }

    /// Extend the file with `len` zero bytes past the filled watermark.
    pub fn allocate_space(&mut self, len: u64) -> Result<()> {
        let new_end = self.filled_up_to + len;
        self.file.set_len(new_end)?;
        self.filled_up_to = new_end;
        Ok(())
    }

    /// Number of meaningful bytes in the file.
    #[inline]
    pub fn filled_up_to(&self) -> u64 {
        self.filled_up_to
    }

    /// fsync the file contents and metadata.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Truncate the file to `size` bytes.
    pub fn shrink(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        self.filled_up_to = size;
        Ok(())
    }

    /// Delete the file from disk. Consumes the handle.
    pub fn delete(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        fs::remove_file(path)?;
        Ok(())
    }

    /// Rename the underlying file on disk.
    pub fn rename_to<P: AsRef<Path>>(&mut self, new_path: P) -> Result<()> {
        let new_path = new_path.as_ref().to_path_buf();
        fs::rename(&self.path, &new_path)?;
        self.path = new_path;
        Ok(())
    }

    /// File name component of the path.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
