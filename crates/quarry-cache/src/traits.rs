use std::io::Read;
use std::path::PathBuf;

use quarry_crypto::ContentHasher;
use quarry_types::{Digest, HashAlgorithm};

use crate::error::{CacheError, CacheResult};

/// Result of inserting content into the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePut {
    /// Digest the content is filed under.
    pub digest: Digest,
    /// Content length in bytes.
    pub size: u64,
    /// `false` if the blob was already cached and nothing was written.
    pub written: bool,
}

/// Content-addressed blob cache.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written. The same content always produces the
///   same digest, so a second write of a digest is a no-op.
/// - No partially written blob is ever visible under its final digest.
/// - Once a `put` succeeds, `get` for that digest returns byte-identical
///   content until the blob is removed by garbage collection.
/// - The cache never touches the network.
pub trait BlobCache: Send + Sync {
    /// Stream content into the cache, hashing it with `algorithm` on the way.
    fn put_reader(&self, algorithm: HashAlgorithm, reader: &mut dyn Read) -> CacheResult<CachePut>;

    /// Insert content that is expected to hash to `digest`.
    ///
    /// Fails with [`CacheError::DigestMismatch`] without storing anything if
    /// the content does not match. Used when filling the cache from a remote.
    fn insert(&self, digest: &Digest, content: &[u8]) -> CacheResult<CachePut>;

    /// Stream content that is expected to hash to `digest` into the cache.
    ///
    /// Same contract as [`BlobCache::insert`]. The default buffers the whole
    /// reader; directory-backed caches stage it on disk instead.
    fn insert_reader(&self, digest: &Digest, reader: &mut dyn Read) -> CacheResult<CachePut> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        self.insert(digest, &content)
    }

    /// Read a whole blob. Returns `Ok(None)` if it is not cached.
    fn get(&self, digest: &Digest) -> CacheResult<Option<Vec<u8>>>;

    /// Open a blob for streaming reads. Returns `Ok(None)` if it is not cached.
    fn open(&self, digest: &Digest) -> CacheResult<Option<Box<dyn Read + Send>>>;

    /// Check whether a blob is cached.
    fn has(&self, digest: &Digest) -> CacheResult<bool>;

    /// Size in bytes of a cached blob.
    fn blob_size(&self, digest: &Digest) -> CacheResult<Option<u64>>;

    /// All cached digests, sorted.
    fn list(&self) -> CacheResult<Vec<Digest>>;

    /// Remove a blob. Returns `true` if it existed.
    ///
    /// Intended for garbage collection only.
    fn remove(&self, digest: &Digest) -> CacheResult<bool>;

    /// Path of a cached blob's file, for caches that keep one file per blob.
    fn blob_path(&self, _digest: &Digest) -> Option<PathBuf> {
        None
    }

    /// Directory for large scratch files on the same filesystem as the
    /// cache, if it has one.
    fn scratch_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Hash in-memory content and store it.
    fn put(&self, algorithm: HashAlgorithm, content: &[u8]) -> CacheResult<CachePut> {
        let mut reader = content;
        self.put_reader(algorithm, &mut reader)
    }

    /// Re-hash a cached blob and compare it to its digest.
    ///
    /// Returns `Ok(false)` if the stored bytes no longer match.
    fn verify(&self, digest: &Digest) -> CacheResult<bool> {
        let reader = self
            .open(digest)?
            .ok_or_else(|| CacheError::NotFound(digest.clone()))?;
        let (actual, _) = ContentHasher::hash_reader(digest.algorithm(), reader)?;
        Ok(actual == *digest)
    }
}
