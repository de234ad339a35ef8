use std::fs::File;
use std::io::{self, BufReader, Seek};
use std::path::{Path, PathBuf};

use quarry_cache::{BlobCache, CachePut};
use quarry_crypto::ContentHasher;
use quarry_types::HashAlgorithm;
use tracing::{debug, info, warn};

use crate::entry::{normalize_tracked_path, ManifestEntry};
use crate::error::{ManifestError, ManifestResult};
use crate::pointer::{pointer_path_for, read_pointer, write_pointer};

/// Result of tracking one working file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tracked {
    /// The entry now recorded in the pointer file.
    pub entry: ManifestEntry,
    /// The entry the pointer file held before, if any.
    pub previous: Option<ManifestEntry>,
    /// Whether a new blob was written to the cache.
    pub blob_written: bool,
    /// Location of the pointer file.
    pub pointer_file: PathBuf,
}

impl Tracked {
    /// `true` if the recorded content differs from the previous version.
    pub fn changed(&self) -> bool {
        self.previous.as_ref() != Some(&self.entry)
    }
}

/// Hashes working files into the cache and writes their pointer files.
pub struct Tracker<'a> {
    root: &'a Path,
    cache: &'a dyn BlobCache,
    algorithm: HashAlgorithm,
}

impl<'a> Tracker<'a> {
    /// Create a tracker for the repository at `root`.
    ///
    /// Fails if `algorithm` is a legacy algorithm: old pointer files may still
    /// use one, but new content never does.
    pub fn new(root: &'a Path, cache: &'a dyn BlobCache, algorithm: HashAlgorithm) -> ManifestResult<Self> {
        if algorithm.is_legacy() {
            return Err(ManifestError::LegacyAlgorithm(algorithm));
        }
        Ok(Self {
            root,
            cache,
            algorithm,
        })
    }

    /// Track a working file: hash it, store the blob, and build or overwrite
    /// its pointer record.
    ///
    /// Re-tracking unchanged content produces an identical entry and writes no
    /// new blob.
    pub fn track(&self, path: &Path) -> ManifestResult<Tracked> {
        let tracked_path = normalize_tracked_path(self.root, path)?;
        let working = self.root.join(&tracked_path);

        let mut file = match File::open(&working) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(working));
            }
            Err(e) => return Err(ManifestError::io(&working, e)),
        };
        let meta = file.metadata().map_err(|e| ManifestError::io(&working, e))?;
        if !meta.is_file() {
            return Err(ManifestError::InvalidPath(format!(
                "{tracked_path} is not a regular file"
            )));
        }

        let previous = self.previous_entry(&tracked_path);

        let put = match self.cached_copy(previous.as_ref(), meta.len(), &mut file, &working)? {
            Some(put) => put,
            None => {
                let mut reader = BufReader::new(&mut file);
                self.cache.put_reader(self.algorithm, &mut reader)?
            }
        };
        let entry = ManifestEntry::new(tracked_path, put.digest, put.size);
        let pointer_file = write_pointer(self.root, &entry)?;

        if previous.as_ref() == Some(&entry) {
            debug!(path = %entry.path, "content unchanged");
        } else {
            info!(
                path = %entry.path,
                digest = %entry.digest.short_hex(),
                size = entry.size,
                "tracked new content"
            );
        }

        Ok(Tracked {
            entry,
            previous,
            blob_written: put.written,
            pointer_file,
        })
    }

    /// When the working file still has its recorded size, hash it in place
    /// and look the digest up, so unchanged content never reaches the cache's
    /// staging area. Leaves `file` rewound when the blob is not cached.
    fn cached_copy(
        &self,
        previous: Option<&ManifestEntry>,
        size: u64,
        file: &mut File,
        working: &Path,
    ) -> ManifestResult<Option<CachePut>> {
        if previous.map(|p| p.size) != Some(size) {
            return Ok(None);
        }
        let (digest, hashed) =
            ContentHasher::hash_reader(self.algorithm, BufReader::new(&mut *file))
                .map_err(|e| ManifestError::io(working, e))?;
        if self.cache.blob_size(&digest)? == Some(hashed) {
            return Ok(Some(CachePut {
                digest,
                size: hashed,
                written: false,
            }));
        }
        file.rewind().map_err(|e| ManifestError::io(working, e))?;
        Ok(None)
    }

    fn previous_entry(&self, tracked_path: &str) -> Option<ManifestEntry> {
        let pointer = pointer_path_for(self.root, tracked_path);
        if !pointer.exists() {
            return None;
        }
        match read_pointer(&pointer) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(pointer = %pointer.display(), error = %e, "overwriting unreadable pointer file");
                None
            }
        }
    }
}
