//! Manifest entry type and tracked-path normalization.

use std::path::{Component, Path, PathBuf};

use quarry_types::{Digest, HashAlgorithm};

use crate::error::{ManifestError, ManifestResult};
use crate::pointer::POINTER_EXTENSION;

/// A tracked path and the blob it points at.
///
/// `path` is relative to the repository root and always uses `/` as the
/// separator, so the same pointer file reads identically on every platform.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ManifestEntry {
    /// Repository-relative path of the working file.
    pub path: String,
    /// Digest of the content, carrying its algorithm.
    pub digest: Digest,
    /// Content size in bytes.
    pub size: u64,
}

impl ManifestEntry {
    /// Create a new manifest entry.
    pub fn new(path: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            path: path.into(),
            digest,
            size,
        }
    }

    /// The algorithm the digest was computed with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.digest.algorithm()
    }

    /// Storage key of the referenced blob: `<algorithm>/<hex>`.
    pub fn blob_ref(&self) -> String {
        self.digest.blob_ref()
    }

    /// Absolute location of the working file under `root`.
    pub fn working_path(&self, root: &Path) -> PathBuf {
        self.path.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }
}

/// Turn a user-supplied path into the repository-relative form stored in a
/// pointer record.
///
/// Absolute paths must live under `root`. Parent-directory components,
/// pointer files themselves, and anything inside `.quarry/` are rejected.
pub fn normalize_tracked_path(root: &Path, path: &Path) -> ManifestResult<String> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root).map_err(|_| {
            ManifestError::InvalidPath(format!(
                "{} is outside the repository at {}",
                path.display(),
                root.display()
            ))
        })?
    } else {
        path
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    ManifestError::InvalidPath(format!("{} is not valid UTF-8", path.display()))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ManifestError::InvalidPath(format!(
                    "{} escapes the repository root",
                    path.display()
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(ManifestError::InvalidPath("empty path".to_string()));
    }
    if parts[0] == ".quarry" {
        return Err(ManifestError::InvalidPath(format!(
            "{} is inside the quarry directory",
            path.display()
        )));
    }
    let normalized = parts.join("/");
    if normalized.ends_with(&format!(".{POINTER_EXTENSION}")) {
        return Err(ManifestError::InvalidPath(format!(
            "{normalized} is a pointer file, not an artifact"
        )));
    }
    Ok(normalized)
}
