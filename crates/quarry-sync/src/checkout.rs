//! Materialize working files from the cache, pulling on a miss.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_cache::BlobCache;
use quarry_crypto::HashingReader;
use quarry_manifest::{status, EntryStatus, ManifestEntry};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::engine::{pull_blob, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::pool::run_batch;
use crate::types::{CheckoutOutcome, CheckoutReport, EntryOutcome, Outcome, PullOutcome};

/// Write the cached blob for `entry` to its working path under `root`.
///
/// The bytes are copied into a temporary file next to the target and hashed on
/// the way; only a verified copy is renamed over the target, so the previous
/// file survives any failure. Returns the number of bytes written.
pub fn materialize(cache: &dyn BlobCache, root: &Path, entry: &ManifestEntry) -> SyncResult<u64> {
    let reader = cache.open(&entry.digest)?.ok_or_else(|| SyncError::NotCached {
        blob: entry.blob_ref(),
    })?;

    let target = entry.working_path(root);
    let dir = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;

    let mut staged = NamedTempFile::new_in(&dir).map_err(|e| SyncError::io(&dir, e))?;
    let mut hashing = HashingReader::new(reader, entry.algorithm());
    io::copy(&mut hashing, staged.as_file_mut()).map_err(|e| SyncError::io(staged.path(), e))?;
    let (digest, size) = hashing.finish();
    if digest != entry.digest || size != entry.size {
        warn!(path = %entry.path, digest = %entry.digest.short_hex(), "cached blob failed verification");
        return Err(SyncError::CorruptCache {
            blob: entry.blob_ref(),
        });
    }

    staged.flush().map_err(|e| SyncError::io(staged.path(), e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| SyncError::io(staged.path(), e))?;
    staged
        .persist(&target)
        .map_err(|e| SyncError::io(&target, e.error))?;

    debug!(path = %entry.path, size, "working file restored");
    Ok(size)
}

impl SyncEngine {
    /// Restore every entry's working file under `root`.
    ///
    /// Files that already match their entry are left alone. Blobs missing from
    /// the cache are pulled first.
    pub async fn checkout(&self, root: &Path, entries: &[ManifestEntry]) -> CheckoutReport {
        let root: Arc<PathBuf> = Arc::new(root.to_path_buf());
        let engine = self.clone();
        let outcomes = run_batch(
            entries.to_vec(),
            self.options.jobs,
            &self.options.cancel,
            move |entry| {
                let engine = engine.clone();
                let root = root.clone();
                async move {
                    match engine.checkout_one(&root, &entry).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(path = %entry.path, error = %e, "checkout failed");
                            CheckoutOutcome::failed(e)
                        }
                    }
                }
            },
        )
        .await;

        let report = CheckoutReport::from(
            entries
                .iter()
                .cloned()
                .zip(outcomes)
                .map(|(entry, outcome)| EntryOutcome { entry, outcome })
                .collect::<Vec<_>>(),
        );
        info!(summary = %report.summary(), "checkout finished");
        report
    }

    async fn checkout_one(&self, root: &Path, entry: &ManifestEntry) -> SyncResult<CheckoutOutcome> {
        let current = {
            let root = root.to_path_buf();
            let entry = entry.clone();
            tokio::task::spawn_blocking(move || status(&root, &entry))
                .await
                .map_err(|e| SyncError::Task(e.to_string()))??
        };
        if current == EntryStatus::Unchanged {
            return Ok(CheckoutOutcome::AlreadyUpToDate);
        }

        let pulled = matches!(
            pull_blob(self.cache.clone(), self.remote.clone(), &entry.digest).await?,
            PullOutcome::Downloaded { .. }
        );

        let cache = self.cache.clone();
        let root = root.to_path_buf();
        let entry = entry.clone();
        let bytes = tokio::task::spawn_blocking(move || materialize(cache.as_ref(), &root, &entry))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;
        Ok(CheckoutOutcome::Restored { bytes, pulled })
    }
}
