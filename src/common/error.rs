//! Error types for the disk cache.

use thiserror::Error;

use crate::common::FileId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write
/// `Result<T>`, following the `std::io::Result` pattern.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in the disk cache.
///
/// Structural misuse (releasing a page that was never pinned) and
/// recoverable conditions (exhaustion, I/O) share one enum so that callers
/// handle errors uniformly, but the variants keep the classes apart:
/// `NotPinned` aborts the calling operation, `CacheExhausted` and `Io` may
/// be retried after growing configuration or fixing the environment.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the raw file layer or the write-ahead log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation referenced a file id never registered through
    /// `open_file`, or one already closed.
    #[error("file {0} is not registered in the disk cache")]
    FileNotRegistered(FileId),

    /// Every eviction candidate in the target queue is pinned and cache
    /// growth is disabled.
    #[error("all eviction candidates in the read cache are pinned")]
    CacheExhausted,

    /// A page was released without a matching pin.
    ///
    /// This indicates a bug in the caller: it would mask a double-release
    /// if it succeeded silently.
    #[error("page ({0}, {1}) was released but is not pinned")]
    NotPinned(FileId, u64),

    /// A file-wide flush or close ran into a pinned page.
    #[error("page ({0}, {1}) is pinned and blocks the file flush")]
    PageInUse(FileId, u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotPinned(FileId::new(1), 42);
        assert_eq!(format!("{err}"), "page (File(1), 42) was released but is not pinned");

        let err = Error::CacheExhausted;
        assert_eq!(
            format!("{err}"),
            "all eviction candidates in the read cache are pinned"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
