//! Directory-backed blob cache.
//!
//! Blobs are stored one file per digest under a 2-level fan-out:
//! `{root}/{algorithm}/{hex[0..2]}/{hex[2..4]}/{hex}`. New content is staged
//! in `{root}/tmp/` and renamed into place once fully written and synced.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use quarry_crypto::{ContentHasher, HashingWriter};
use quarry_types::{Digest, HashAlgorithm};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{CacheError, CacheResult};
use crate::traits::{BlobCache, CachePut};

const STAGING_DIR: &str = "tmp";

/// Sharded on-disk blob cache.
#[derive(Clone, Debug)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Open (or create) a cache rooted at the given directory.
    pub fn open(root: impl AsRef<Path>) -> CacheResult<Self> {
        let root = root.as_ref().to_path_buf();
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging).map_err(|e| CacheError::at(&staging, e))?;
        Ok(Self { root })
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of a blob, whether or not it exists.
    pub fn slot_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.shard_path())
    }

    fn staging_file(&self) -> CacheResult<NamedTempFile> {
        let staging = self.root.join(STAGING_DIR);
        NamedTempFile::new_in(&staging).map_err(|e| CacheError::at(&staging, e))
    }

    /// Move a fully written staging file into the digest slot.
    ///
    /// If the slot already holds the blob the staged copy is discarded.
    fn finalize(&self, staged: NamedTempFile, digest: Digest, size: u64) -> CacheResult<CachePut> {
        let slot = self.slot_path(&digest);
        if slot.is_file() {
            debug!(digest = %digest.short_hex(), "blob already cached");
            return Ok(CachePut {
                digest,
                size,
                written: false,
            });
        }

        staged.as_file().sync_all()?;
        if let Some(parent) = slot.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::at(parent, e))?;
        }
        // A racing writer of the same digest may win the rename; both copies
        // hold identical bytes so either outcome is correct.
        staged
            .persist(&slot)
            .map_err(|e| CacheError::at(&slot, e.error))?;

        debug!(digest = %digest.short_hex(), size, path = %slot.display(), "blob cached");
        Ok(CachePut {
            digest,
            size,
            written: true,
        })
    }
}

fn mismatch(expected: &Digest, actual: Digest) -> CacheError {
    warn!(expected = %expected.blob_ref(), actual = %actual.blob_ref(), "refusing to cache mismatched content");
    CacheError::DigestMismatch {
        expected: expected.clone(),
        actual,
    }
}

impl BlobCache for DiskCache {
    fn put_reader(&self, algorithm: HashAlgorithm, reader: &mut dyn Read) -> CacheResult<CachePut> {
        let staged = self.staging_file()?;
        let mut writer = HashingWriter::new(staged, algorithm);
        io::copy(reader, &mut writer)?;
        let (staged, digest, size) = writer.finish()?;
        self.finalize(staged, digest, size)
    }

    fn insert(&self, digest: &Digest, content: &[u8]) -> CacheResult<CachePut> {
        let actual = ContentHasher::hash(digest.algorithm(), content);
        if actual != *digest {
            return Err(mismatch(digest, actual));
        }
        if self.has(digest)? {
            return Ok(CachePut {
                digest: actual,
                size: content.len() as u64,
                written: false,
            });
        }
        let mut staged = self.staging_file()?;
        staged.write_all(content)?;
        self.finalize(staged, actual, content.len() as u64)
    }

    fn insert_reader(&self, digest: &Digest, reader: &mut dyn Read) -> CacheResult<CachePut> {
        let staged = self.staging_file()?;
        let mut writer = HashingWriter::new(staged, digest.algorithm());
        io::copy(reader, &mut writer)?;
        let (staged, actual, size) = writer.finish()?;
        // Dropping the staged file deletes it.
        if actual != *digest {
            return Err(mismatch(digest, actual));
        }
        self.finalize(staged, actual, size)
    }

    fn get(&self, digest: &Digest) -> CacheResult<Option<Vec<u8>>> {
        let slot = self.slot_path(digest);
        match fs::read(&slot) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::at(slot, e)),
        }
    }

    fn open(&self, digest: &Digest) -> CacheResult<Option<Box<dyn Read + Send>>> {
        let slot = self.slot_path(digest);
        match File::open(&slot) {
            Ok(file) => Ok(Some(Box::new(io::BufReader::new(file)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::at(slot, e)),
        }
    }

    fn has(&self, digest: &Digest) -> CacheResult<bool> {
        Ok(self.blob_size(digest)?.is_some())
    }

    fn blob_size(&self, digest: &Digest) -> CacheResult<Option<u64>> {
        let slot = self.slot_path(digest);
        match fs::metadata(&slot) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::at(slot, e)),
        }
    }

    fn list(&self) -> CacheResult<Vec<Digest>> {
        let mut digests = Vec::new();
        for algorithm in HashAlgorithm::ALL {
            let base = self.root.join(algorithm.as_str());
            if !base.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&base).min_depth(3).max_depth(3) {
                let entry = entry.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| base.clone());
                    CacheError::at(path, io::Error::other(e.to_string()))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str() else {
                    continue;
                };
                match Digest::from_hex(algorithm, name) {
                    Ok(digest) => digests.push(digest),
                    Err(_) => warn!(path = %entry.path().display(), "ignoring stray file in cache"),
                }
            }
        }
        digests.sort();
        Ok(digests)
    }

    fn blob_path(&self, digest: &Digest) -> Option<PathBuf> {
        let slot = self.slot_path(digest);
        slot.is_file().then_some(slot)
    }

    fn scratch_dir(&self) -> Option<PathBuf> {
        Some(self.root.join(STAGING_DIR))
    }

    fn remove(&self, digest: &Digest) -> CacheResult<bool> {
        let slot = self.slot_path(digest);
        match fs::remove_file(&slot) {
            Ok(()) => {
                debug!(digest = %digest.short_hex(), "blob removed from cache");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::at(slot, e)),
        }
    }
}
