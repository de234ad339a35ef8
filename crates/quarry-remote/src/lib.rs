//! Remote object stores for Quarry.
//!
//! A remote holds the same immutable blobs as the local cache, keyed by
//! digest, and is append-only: objects are added, never overwritten or
//! deleted. Every backend implements [`RemoteStore`]; callers obtain one from
//! [`open_remote`] and never branch on the backend type.
//!
//! # Backends
//!
//! - [`LocalMirror`] -- directory tree, `file://` URLs or bare paths
//! - [`HttpRemote`] -- HTTP object store (`quarry-server`), `http(s)://` URLs
//! - [`InMemoryRemote`] -- in-process store with fault injection, for tests
//!
//! [`RetryingRemote`] wraps any backend with bounded exponential backoff on
//! transient failures.

pub mod auth;
pub mod error;
pub mod http;
pub mod memory;
pub mod mirror;
pub mod protocol;
pub mod retry;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use auth::{Credentials, DEFAULT_TOKEN_ENV};
pub use error::{RemoteError, RemoteResult};
pub use http::{HttpRemote, DEFAULT_TIMEOUT};
pub use memory::InMemoryRemote;
pub use mirror::LocalMirror;
pub use retry::{RetryPolicy, RetryingRemote};
pub use traits::{is_valid_prefix, PutOutcome, RemoteStore};

/// Open the remote named by `url` with the default request timeout.
///
/// `http://` and `https://` select [`HttpRemote`]; `file://` and bare paths
/// select [`LocalMirror`]. Any other scheme is rejected.
pub fn open_remote(url: &str, credentials: Credentials) -> RemoteResult<Arc<dyn RemoteStore>> {
    open_remote_with_timeout(url, credentials, DEFAULT_TIMEOUT)
}

/// Like [`open_remote`], with an explicit timeout for network backends.
pub fn open_remote_with_timeout(
    url: &str,
    credentials: Credentials,
    timeout: Duration,
) -> RemoteResult<Arc<dyn RemoteStore>> {
    let url = url.trim();
    if url.is_empty() {
        return Err(RemoteError::InvalidUrl(url.to_string()));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Arc::new(HttpRemote::new(url, credentials, timeout)?));
    }
    if let Some(path) = url.strip_prefix("file://") {
        if path.is_empty() {
            return Err(RemoteError::InvalidUrl(url.to_string()));
        }
        return Ok(Arc::new(LocalMirror::new(path)));
    }
    if url.contains("://") {
        return Err(RemoteError::InvalidUrl(url.to_string()));
    }
    Ok(Arc::new(LocalMirror::new(url)))
}
