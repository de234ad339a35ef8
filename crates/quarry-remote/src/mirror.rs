//! Filesystem mirror backend.
//!
//! Objects use the same layout as the local cache,
//! `{root}/{algorithm}/{hex[0..2]}/{hex[2..4]}/{hex}`, so a mirror can sit on
//! a network share or be served over HTTP by `quarry-server`. Uploads are
//! staged in `{root}/tmp/<uuid>` and renamed into place.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use quarry_crypto::HashingWriter;
use quarry_types::{Digest, HashAlgorithm};
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{RemoteError, RemoteResult};
use crate::traits::{is_valid_prefix, PutOutcome, RemoteStore};

const STAGING_DIR: &str = "tmp";

/// Remote store backed by a directory tree.
#[derive(Clone, Debug)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    /// A mirror rooted at `root`. Directories are created on first upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of an object, whether or not it exists.
    pub fn object_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.shard_path())
    }

    /// Stage `content` while hashing it, then rename it into place if it
    /// matches `digest`.
    fn put_blocking(&self, digest: &Digest, content: &mut dyn Read) -> RemoteResult<PutOutcome> {
        let target = self.object_path(digest);
        if target.is_file() {
            return Ok(PutOutcome::AlreadyPresent);
        }

        let staging_dir = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging_dir).map_err(|e| RemoteError::io(&staging_dir, e))?;
        let staged = staging_dir.join(Uuid::now_v7().to_string());
        let (actual, size) = match write_synced(&staged, digest.algorithm(), content) {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&staged);
                return Err(RemoteError::io(&staged, e));
            }
        };
        if actual != *digest {
            let _ = fs::remove_file(&staged);
            return Err(RemoteError::Rejected {
                backend: self.describe(),
                reason: format!("content hashes to {}, not {}", actual.blob_ref(), digest.blob_ref()),
            });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| RemoteError::io(parent, e))?;
        }
        // A concurrent upload of the same digest may land first. Both copies
        // hold identical bytes, so replacing it is harmless.
        if let Err(e) = fs::rename(&staged, &target) {
            let _ = fs::remove_file(&staged);
            return Err(RemoteError::io(&target, e));
        }

        debug!(digest = %digest.short_hex(), size, mirror = %self.root.display(), "object stored");
        Ok(PutOutcome::Stored)
    }

    fn copy_out_blocking(&self, digest: &Digest, target: &Path) -> RemoteResult<Option<u64>> {
        let path = self.object_path(digest);
        let mut source = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RemoteError::io(path, e)),
        };
        let mut out = File::create(target).map_err(|e| RemoteError::io(target, e))?;
        let size = io::copy(&mut source, &mut out).map_err(|e| RemoteError::io(target, e))?;
        Ok(Some(size))
    }

    fn list_blocking(&self, algorithm: HashAlgorithm, prefix: &str) -> RemoteResult<Vec<Digest>> {
        // Narrow the walk to the shard directories the prefix pins down.
        let mut dir = self.root.join(algorithm.as_str());
        let mut depth = 3;
        for shard in [prefix.get(0..2), prefix.get(2..4)].into_iter().flatten() {
            dir = dir.join(shard);
            depth -= 1;
        }
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(depth).max_depth(depth) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                RemoteError::io(path, io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }
            // Stray files are not objects.
            if let Ok(digest) = Digest::from_hex(algorithm, name) {
                found.push(digest);
            }
        }
        found.sort();
        Ok(found)
    }
}

fn write_synced(path: &Path, algorithm: HashAlgorithm, content: &mut dyn Read) -> io::Result<(Digest, u64)> {
    let mut writer = HashingWriter::new(File::create(path)?, algorithm);
    io::copy(content, &mut writer)?;
    let (file, digest, size) = writer.finish()?;
    file.sync_all()?;
    Ok((digest, size))
}

fn join_error(root: &Path, e: tokio::task::JoinError) -> RemoteError {
    RemoteError::io(root, io::Error::other(e.to_string()))
}

#[async_trait]
impl RemoteStore for LocalMirror {
    async fn put(&self, digest: &Digest, content: Bytes) -> RemoteResult<PutOutcome> {
        let mirror = self.clone();
        let digest = digest.clone();
        tokio::task::spawn_blocking(move || mirror.put_blocking(&digest, &mut &content[..]))
            .await
            .map_err(|e| join_error(&self.root, e))?
    }

    async fn get(&self, digest: &Digest) -> RemoteResult<Option<Bytes>> {
        let path = self.object_path(digest);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RemoteError::io(path, e)),
        }
    }

    async fn exists(&self, digest: &Digest) -> RemoteResult<bool> {
        let path = self.object_path(digest);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RemoteError::io(path, e)),
        }
    }

    async fn list(&self, algorithm: HashAlgorithm, hex_prefix: &str) -> RemoteResult<Vec<Digest>> {
        if !is_valid_prefix(algorithm, hex_prefix) {
            return Err(RemoteError::InvalidPrefix(hex_prefix.to_string()));
        }
        let mirror = self.clone();
        let prefix = hex_prefix.to_string();
        tokio::task::spawn_blocking(move || mirror.list_blocking(algorithm, &prefix))
            .await
            .map_err(|e| join_error(&self.root, e))?
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn put_file(&self, digest: &Digest, source: &Path) -> RemoteResult<PutOutcome> {
        let mirror = self.clone();
        let digest = digest.clone();
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut file = File::open(&source).map_err(|e| RemoteError::io(&source, e))?;
            mirror.put_blocking(&digest, &mut file)
        })
        .await
        .map_err(|e| join_error(&self.root, e))?
    }

    async fn get_to_file(&self, digest: &Digest, target: &Path) -> RemoteResult<Option<u64>> {
        let mirror = self.clone();
        let digest = digest.clone();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || mirror.copy_out_blocking(&digest, &target))
            .await
            .map_err(|e| join_error(&self.root, e))?
    }
}
