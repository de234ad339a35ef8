//! Error types for the manifest crate.

use std::path::PathBuf;

use quarry_types::{ErrorClass, HashAlgorithm};

/// Errors that can occur while tracking or reading pointer records.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The working file to track does not exist.
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A pointer record is missing fields or has malformed values.
    #[error("corrupt pointer record {location}: {reason}")]
    Corrupt { location: String, reason: String },

    /// New content may not be tracked with a weak legacy algorithm.
    #[error("{0} is a legacy algorithm and cannot be used to track new content")]
    LegacyAlgorithm(HashAlgorithm),

    /// The path cannot be tracked (outside the repository, a directory, ...).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Cache operation failed.
    #[error("cache error: {0}")]
    Cache(#[from] quarry_cache::CacheError),

    /// I/O error reading or writing a working or pointer file.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Map into the user-facing error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::LegacyAlgorithm(_) | Self::InvalidPath(_) => {
                ErrorClass::Argument
            }
            Self::Corrupt { .. } => ErrorClass::ManifestCorrupt,
            Self::Cache(e) => e.class(),
            Self::Io { .. } => ErrorClass::Io,
        }
    }
}

/// Convenience alias for manifest results.
pub type ManifestResult<T> = Result<T, ManifestError>;
