//! Error types used across Camellia components.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum CamelliaError {
    /// Low-level I/O failure. Propagated as-is; never retried.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A structural invariant of an on-disk file was violated.
    ///
    /// The message always names the offending resource and the invalid
    /// value(s). Surfaced immediately; the whole segment open fails rather
    /// than serving partial data.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// An operation was invoked in a state that forbids it
    /// (programming-contract violation).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The operation is not supported by this implementation
    /// (e.g. seek-by-ord on an FST terms index).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Storage-backend failure that is not a plain I/O error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A required text encoding is unavailable or the bytes are not valid
    /// for it.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl CamelliaError {
    /// Create a corrupt-index error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        CamelliaError::CorruptIndex(msg.into())
    }

    /// Create an illegal-state error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        CamelliaError::IllegalState(msg.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        CamelliaError::UnsupportedOperation(msg.into())
    }

    /// Create a storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        CamelliaError::Storage(msg.into())
    }

    /// Create an encoding error.
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        CamelliaError::Encoding(msg.into())
    }
}

/// Result type alias for Camellia operations.
pub type Result<T> = std::result::Result<T, CamelliaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CamelliaError::corrupt("invalid field count: -1, resource: seg0.tib");
        assert_eq!(
            err.to_string(),
            "corrupt index: invalid field count: -1, resource: seg0.tib"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: CamelliaError = io.into();
        assert!(matches!(err, CamelliaError::Io(_)));
    }
}
