use std::error::Error;
use thiserror::Error;

/// Result alias for store adapter operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by replicated store backends regardless of the transport.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or lost a write.
    #[error("store write failed: {message}")]
    WriteFailed {
        /// Human-readable failure description.
        message: String,
        /// Underlying backend error, when one exists.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    /// The addressed path cannot hold the requested value (e.g. a child
    /// write under a scalar).
    #[error("invalid store path `{path}`: {message}")]
    InvalidPath {
        /// Path the operation addressed.
        path: String,
        /// Why the path was rejected.
        message: String,
    },
}

impl StoreError {
    /// Construct a write failure from any backend error.
    pub fn write_failed(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StoreError::WriteFailed {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Construct a write failure with no underlying source.
    pub fn write_rejected(message: impl Into<String>) -> Self {
        StoreError::WriteFailed {
            message: message.into(),
            source: None,
        }
    }
}
