//! Error types for the rendering core
//!
//! One enum covers every failure class the core can report. Subsystems
//! decide recoverability: per-frame transient errors are logged and the
//! affected item skipped, lifecycle errors propagate to the caller, async
//! failures surface only through task callbacks.

use thiserror::Error;

/// The core error type
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Null handle, wrong thread, unknown name, NaN input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A requested resource does not exist
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Remove was called while external references are still held
    #[error("resource busy: {name} has {ref_count} external references")]
    ResourceBusy { name: String, ref_count: i64 },

    /// GPU-side creation failed (program link, buffer alloc, texture alloc)
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// File not found, unreadable, or malformed asset data
    #[error("io error: {0}")]
    Io(String),

    /// Operation requires a prior Initialize call
    #[error("not initialized: {0}")]
    NotInitialized(&'static str),

    /// Initialize was called twice
    #[error("already initialized: {0}")]
    AlreadyInitialized(&'static str),

    /// An async task was cancelled cooperatively
    #[error("cancelled")]
    Cancelled,

    /// Per-frame instance cap hit; the remainder is deferred, not lost
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::ResourceBusy {
            name: "cube".into(),
            ref_count: 3,
        };
        assert_eq!(e.to_string(), "resource busy: cube has 3 external references");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.png");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
