//! Working copy status.
//!
//! Compares a working file against the digest recorded in its pointer.
//! Nothing here writes to the cache or to pointer files.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use quarry_crypto::ContentHasher;

use crate::entry::ManifestEntry;
use crate::error::{ManifestError, ManifestResult};

/// State of a working file relative to its manifest entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// Content matches the recorded digest.
    Unchanged,
    /// Content differs from the recorded digest.
    Modified,
    /// The working file does not exist.
    Missing,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::Modified => "modified",
            Self::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// Classify the working file for `entry` under `root`.
///
/// A size mismatch short-circuits to `Modified`; otherwise the file is hashed
/// with the entry's own algorithm, so legacy entries are compared correctly.
pub fn status(root: &Path, entry: &ManifestEntry) -> ManifestResult<EntryStatus> {
    let working = entry.working_path(root);
    let meta = match fs::metadata(&working) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(EntryStatus::Missing),
        Err(e) => return Err(ManifestError::io(&working, e)),
    };
    if !meta.is_file() || meta.len() != entry.size {
        return Ok(EntryStatus::Modified);
    }

    let file = File::open(&working).map_err(|e| ManifestError::io(&working, e))?;
    let (digest, _) = ContentHasher::hash_reader(entry.algorithm(), BufReader::new(file))
        .map_err(|e| ManifestError::io(&working, e))?;
    if digest == entry.digest {
        Ok(EntryStatus::Unchanged)
    } else {
        Ok(EntryStatus::Modified)
    }
}

/// Status of a batch of entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub entries: Vec<(ManifestEntry, EntryStatus)>,
}

impl StatusReport {
    /// Compute the status of every entry.
    pub fn compute(root: &Path, entries: &[ManifestEntry]) -> ManifestResult<Self> {
        let entries = entries
            .iter()
            .map(|entry| Ok((entry.clone(), status(root, entry)?)))
            .collect::<ManifestResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Number of entries with the given status.
    pub fn count(&self, wanted: EntryStatus) -> usize {
        self.entries.iter().filter(|(_, s)| *s == wanted).count()
    }

    /// Returns `true` if every working file matches its entry.
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|(_, s)| *s == EntryStatus::Unchanged)
    }
}
