use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use quarry_crypto::ContentHasher;
use quarry_types::{Digest, HashAlgorithm};

use crate::error::{CacheError, CacheResult};
use crate::traits::{BlobCache, CachePut};

/// In-memory, HashMap-based blob cache.
///
/// Intended for tests and embedding. Blobs are held behind a `RwLock` and
/// cloned on read. The cache counts how many blobs were actually written so
/// tests can assert on deduplication.
pub struct InMemoryCache {
    blobs: RwLock<HashMap<Digest, Vec<u8>>>,
    writes: AtomicUsize,
}

impl InMemoryCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of blobs currently cached.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Number of blob writes that actually stored new content.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Drop every blob, simulating a wiped cache directory.
    pub fn clear(&self) {
        self.blobs.write().expect("lock poisoned").clear();
    }

    fn store(&self, digest: Digest, content: Vec<u8>) -> CachePut {
        let size = content.len() as u64;
        let mut map = self.blobs.write().expect("lock poisoned");
        let written = if map.contains_key(&digest) {
            false
        } else {
            map.insert(digest.clone(), content);
            self.writes.fetch_add(1, Ordering::SeqCst);
            true
        };
        CachePut {
            digest,
            size,
            written,
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobCache for InMemoryCache {
    fn put_reader(&self, algorithm: HashAlgorithm, reader: &mut dyn Read) -> CacheResult<CachePut> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let digest = ContentHasher::hash(algorithm, &content);
        Ok(self.store(digest, content))
    }

    fn insert(&self, digest: &Digest, content: &[u8]) -> CacheResult<CachePut> {
        let actual = ContentHasher::hash(digest.algorithm(), content);
        if actual != *digest {
            return Err(CacheError::DigestMismatch {
                expected: digest.clone(),
                actual,
            });
        }
        Ok(self.store(actual, content.to_vec()))
    }

    fn get(&self, digest: &Digest) -> CacheResult<Option<Vec<u8>>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(digest).cloned())
    }

    fn open(&self, digest: &Digest) -> CacheResult<Option<Box<dyn Read + Send>>> {
        Ok(self
            .get(digest)?
            .map(|data| Box::new(Cursor::new(data)) as Box<dyn Read + Send>))
    }

    fn has(&self, digest: &Digest) -> CacheResult<bool> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.contains_key(digest))
    }

    fn blob_size(&self, digest: &Digest) -> CacheResult<Option<u64>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(digest).map(|b| b.len() as u64))
    }

    fn list(&self) -> CacheResult<Vec<Digest>> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut digests: Vec<Digest> = map.keys().cloned().collect();
        digests.sort();
        Ok(digests)
    }

    fn remove(&self, digest: &Digest) -> CacheResult<bool> {
        let mut map = self.blobs.write().expect("lock poisoned");
        Ok(map.remove(digest).is_some())
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("blob_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get() {
        let cache = InMemoryCache::new();
        let put = cache.put(HashAlgorithm::Blake3, b"hello world").unwrap();
        assert!(put.written);
        assert_eq!(put.size, 11);
        assert_eq!(cache.get(&put.digest).unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn second_put_writes_nothing() {
        let cache = InMemoryCache::new();
        cache.put(HashAlgorithm::Blake3, b"dup").unwrap();
        let again = cache.put(HashAlgorithm::Blake3, b"dup").unwrap();
        assert!(!again.written);
        assert_eq!(cache.write_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_rejects_wrong_content() {
        let cache = InMemoryCache::new();
        let digest = ContentHasher::hash(HashAlgorithm::Blake3, b"expected");
        let err = cache.insert(&digest, b"something else").unwrap_err();
        assert!(matches!(err, CacheError::DigestMismatch { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_blob_is_none() {
        let cache = InMemoryCache::new();
        let digest = ContentHasher::hash(HashAlgorithm::Sha256, b"absent");
        assert!(cache.get(&digest).unwrap().is_none());
        assert!(!cache.has(&digest).unwrap());
        assert!(cache.open(&digest).unwrap().is_none());
    }

    #[test]
    fn verify_cached_blob() {
        let cache = InMemoryCache::new();
        let put = cache.put(HashAlgorithm::Sha256, b"verify me").unwrap();
        assert!(cache.verify(&put.digest).unwrap());
    }

    #[test]
    fn clear_empties_cache() {
        let cache = InMemoryCache::new();
        cache.put(HashAlgorithm::Blake3, b"a").unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
