use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use quarry_types::{Digest, HashAlgorithm};

use crate::error::{RemoteError, RemoteResult};

/// Result of uploading an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The object was written.
    Stored,
    /// The store already held the object; nothing was written.
    AlreadyPresent,
}

/// An append-only object store keyed by digest.
///
/// Implementations must never overwrite or delete an object. A `put` of a
/// digest the store already holds is a no-op, and an object only becomes
/// visible under its key once it is completely written.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload `content` under `digest`.
    async fn put(&self, digest: &Digest, content: Bytes) -> RemoteResult<PutOutcome>;

    /// Download an object. Returns `Ok(None)` if the store does not hold it.
    ///
    /// The bytes are returned as stored; callers verify them.
    async fn get(&self, digest: &Digest) -> RemoteResult<Option<Bytes>>;

    /// Check whether the store holds an object.
    async fn exists(&self, digest: &Digest) -> RemoteResult<bool>;

    /// Digests of one algorithm whose hex starts with `hex_prefix`, sorted.
    async fn list(&self, algorithm: HashAlgorithm, hex_prefix: &str) -> RemoteResult<Vec<Digest>>;

    /// Human-readable location, used in logs and error messages.
    fn describe(&self) -> String;

    /// Upload the file at `source` under `digest`.
    ///
    /// The default reads the file into memory; backends that can stream
    /// override it.
    async fn put_file(&self, digest: &Digest, source: &Path) -> RemoteResult<PutOutcome> {
        let content = tokio::fs::read(source)
            .await
            .map_err(|e| RemoteError::io(source, e))?;
        self.put(digest, Bytes::from(content)).await
    }

    /// Download an object into `target`, replacing its contents. Returns the
    /// byte count, or `Ok(None)` if the store does not hold the object.
    ///
    /// The bytes are written as stored; callers verify them.
    async fn get_to_file(&self, digest: &Digest, target: &Path) -> RemoteResult<Option<u64>> {
        let Some(content) = self.get(digest).await? else {
            return Ok(None);
        };
        tokio::fs::write(target, &content)
            .await
            .map_err(|e| RemoteError::io(target, e))?;
        Ok(Some(content.len() as u64))
    }
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn put(&self, digest: &Digest, content: Bytes) -> RemoteResult<PutOutcome> {
        (**self).put(digest, content).await
    }

    async fn get(&self, digest: &Digest) -> RemoteResult<Option<Bytes>> {
        (**self).get(digest).await
    }

    async fn exists(&self, digest: &Digest) -> RemoteResult<bool> {
        (**self).exists(digest).await
    }

    async fn list(&self, algorithm: HashAlgorithm, hex_prefix: &str) -> RemoteResult<Vec<Digest>> {
        (**self).list(algorithm, hex_prefix).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn put_file(&self, digest: &Digest, source: &Path) -> RemoteResult<PutOutcome> {
        (**self).put_file(digest, source).await
    }

    async fn get_to_file(&self, digest: &Digest, target: &Path) -> RemoteResult<Option<u64>> {
        (**self).get_to_file(digest, target).await
    }
}

/// Returns `true` if `prefix` can start a digest of `algorithm`: lowercase
/// hex, no longer than the full digest.
pub fn is_valid_prefix(algorithm: HashAlgorithm, prefix: &str) -> bool {
    prefix.len() <= algorithm.output_len() * 2
        && prefix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
