use std::path::PathBuf;

use quarry_types::ErrorClass;
use thiserror::Error;

/// Why one entry of a transfer batch failed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("blob {blob} is not in the local cache")]
    NotCached { blob: String },

    #[error("blob {blob} is not on {remote}")]
    NotOnRemote { blob: String, remote: String },

    #[error("blob {blob} from {remote} is corrupt: content hashes to {actual}")]
    CorruptRemote {
        blob: String,
        remote: String,
        actual: String,
    },

    #[error("cached blob {blob} is corrupt")]
    CorruptCache { blob: String },

    #[error("cancelled before transfer started")]
    Cancelled,

    #[error("remote error: {0}")]
    Remote(#[from] quarry_remote::RemoteError),

    #[error("cache error: {0}")]
    Cache(#[from] quarry_cache::CacheError),

    #[error("manifest error: {0}")]
    Manifest(#[from] quarry_manifest::ManifestError),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map into the user-facing error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotCached { .. }
            | Self::NotOnRemote { .. }
            | Self::CorruptRemote { .. }
            | Self::CorruptCache { .. } => ErrorClass::BlobUnavailable,
            Self::Cancelled | Self::Task(_) => ErrorClass::Other,
            Self::Remote(e) => e.class(),
            Self::Cache(e) => e.class(),
            Self::Manifest(e) => e.class(),
            Self::Io { .. } => ErrorClass::Io,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
