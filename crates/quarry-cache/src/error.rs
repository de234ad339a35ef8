use std::path::PathBuf;

use quarry_types::{Digest, ErrorClass};

/// Errors from blob cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The requested blob is not in the cache.
    #[error("blob not in cache: {}", .0.blob_ref())]
    NotFound(Digest),

    /// Content does not hash to the digest it was filed under.
    #[error("digest mismatch: expected {}, computed {}", .expected.blob_ref(), .actual.blob_ref())]
    DigestMismatch { expected: Digest, actual: Digest },

    /// I/O error at a known location.
    #[error("I/O error at {}: {source}", .path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub(crate) fn at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Map into the user-facing error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::DigestMismatch { .. } => ErrorClass::BlobUnavailable,
            Self::IoAt { .. } | Self::Io(_) => ErrorClass::Io,
        }
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
