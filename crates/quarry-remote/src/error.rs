use std::path::PathBuf;

use quarry_types::ErrorClass;
use thiserror::Error;

/// Errors from remote object store operations.
///
/// Every variant names the backend it came from so that batch reports can say
/// where a transfer failed.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("unsupported remote url: {0}")]
    InvalidUrl(String),

    #[error("invalid digest prefix: {0:?}")]
    InvalidPrefix(String),

    #[error("{backend}: connection failed: {message}")]
    Connect { backend: String, message: String },

    #[error("{backend}: request timed out")]
    Timeout { backend: String },

    #[error("{backend}: HTTP {status}: {message}")]
    Status {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("{backend}: authentication rejected")]
    Unauthorized { backend: String },

    #[error("{backend}: object rejected: {reason}")]
    Rejected { backend: String, reason: String },

    #[error("{backend}: malformed response: {message}")]
    Protocol { backend: String, message: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn from_reqwest(backend: &str, err: reqwest::Error) -> Self {
        let backend = backend.to_string();
        if err.is_timeout() {
            Self::Timeout { backend }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::Connect {
                backend,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Status {
                backend,
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Protocol {
                backend,
                message: err.to_string(),
            }
        }
    }

    /// Whether retrying the same call may succeed: connection failures,
    /// timeouts, 5xx responses, and 429.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Map into the user-facing error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidUrl(_) | Self::InvalidPrefix(_) => ErrorClass::Argument,
            Self::Connect { .. }
            | Self::Timeout { .. }
            | Self::Status { .. }
            | Self::Unauthorized { .. }
            | Self::Protocol { .. } => ErrorClass::Network,
            Self::Rejected { .. } => ErrorClass::BlobUnavailable,
            Self::Io { .. } => ErrorClass::Io,
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
