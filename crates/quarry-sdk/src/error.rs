use std::path::PathBuf;

use quarry_types::ErrorClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("not a quarry repository (or any parent): {}", .0.display())]
    NotInitialized(PathBuf),

    #[error("quarry repository already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("no remote configured; add one with `quarry remote set <url>`")]
    NoRemote,

    #[error("unknown remote: {0}")]
    UnknownRemote(String),

    #[error("invalid config {}: {reason}", .path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cache error: {0}")]
    Cache(#[from] quarry_cache::CacheError),

    #[error("manifest error: {0}")]
    Manifest(#[from] quarry_manifest::ManifestError),

    #[error("remote error: {0}")]
    Remote(#[from] quarry_remote::RemoteError),

    #[error("sync error: {0}")]
    Sync(#[from] quarry_sync::SyncError),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SdkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Map into the user-facing error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotInitialized(_)
            | Self::AlreadyInitialized(_)
            | Self::NoRemote
            | Self::UnknownRemote(_)
            | Self::InvalidArgument(_) => ErrorClass::Argument,
            Self::InvalidConfig { .. } => ErrorClass::ManifestCorrupt,
            Self::Cache(e) => e.class(),
            Self::Manifest(e) => e.class(),
            Self::Remote(e) => e.class(),
            Self::Sync(e) => e.class(),
            Self::Io { .. } => ErrorClass::Io,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(SdkError::NoRemote.class(), ErrorClass::Argument);
        assert_eq!(
            SdkError::config("x", "bad").class(),
            ErrorClass::ManifestCorrupt
        );
        assert_eq!(
            SdkError::io("x", std::io::Error::other("disk")).class(),
            ErrorClass::Io
        );
        assert_eq!(
            SdkError::from(quarry_sync::SyncError::Cancelled).class(),
            ErrorClass::Other
        );
    }
}
