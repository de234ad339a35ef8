//! Push and pull between the local cache and a remote.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use quarry_cache::{BlobCache, CacheError, CachePut};
use quarry_manifest::ManifestEntry;
use quarry_remote::{PutOutcome, RemoteStore};
use quarry_types::Digest;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::pool::run_batch;
use crate::types::{
    EntryOutcome, Outcome, PullOutcome, PullReport, PushOutcome, PushReport, TransferOptions,
    TransferReport,
};

/// Moves blobs between one local cache and one remote.
///
/// The remote is passed in explicitly; there is no default remote.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) cache: Arc<dyn BlobCache>,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) options: TransferOptions,
}

impl SyncEngine {
    pub fn new(cache: Arc<dyn BlobCache>, remote: Arc<dyn RemoteStore>, options: TransferOptions) -> Self {
        Self {
            cache,
            remote,
            options,
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Upload every entry's blob the remote does not already hold.
    ///
    /// Entries sharing a digest are transferred once. A failure in one entry
    /// never stops the others.
    pub async fn push(&self, entries: &[ManifestEntry]) -> PushReport {
        let cache = self.cache.clone();
        let remote = self.remote.clone();
        let report = self
            .for_each_digest(entries, move |digest| {
                let cache = cache.clone();
                let remote = remote.clone();
                async move {
                    match push_blob(cache, remote, &digest).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(digest = %digest.short_hex(), error = %e, "push failed");
                            PushOutcome::failed(e)
                        }
                    }
                }
            })
            .await;
        info!(remote = %self.remote.describe(), summary = %report.summary(), "push finished");
        report
    }

    /// Download every entry's blob that is not cached yet, verifying it
    /// before it enters the cache.
    pub async fn pull(&self, entries: &[ManifestEntry]) -> PullReport {
        let cache = self.cache.clone();
        let remote = self.remote.clone();
        let report = self
            .for_each_digest(entries, move |digest| {
                let cache = cache.clone();
                let remote = remote.clone();
                async move {
                    match pull_blob(cache, remote, &digest).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(digest = %digest.short_hex(), error = %e, "pull failed");
                            PullOutcome::failed(e)
                        }
                    }
                }
            })
            .await;
        info!(remote = %self.remote.describe(), summary = %report.summary(), "pull finished");
        report
    }

    /// Run `work` once per distinct digest and fan the outcome back out to
    /// every entry carrying that digest.
    async fn for_each_digest<O, F, Fut>(&self, entries: &[ManifestEntry], work: F) -> TransferReport<O>
    where
        O: Outcome,
        F: Fn(Digest) -> Fut,
        Fut: std::future::Future<Output = O> + Send + 'static,
    {
        let mut unique: Vec<Digest> = Vec::new();
        let mut slot: HashMap<&Digest, usize> = HashMap::new();
        for entry in entries {
            slot.entry(&entry.digest).or_insert_with(|| {
                unique.push(entry.digest.clone());
                unique.len() - 1
            });
        }
        debug!(entries = entries.len(), unique = unique.len(), "starting batch");

        let outcomes = run_batch(unique, self.options.jobs, &self.options.cancel, work).await;
        TransferReport::from(
            entries
                .iter()
                .map(|entry| EntryOutcome {
                    entry: entry.clone(),
                    outcome: outcomes[slot[&entry.digest]].clone(),
                })
                .collect::<Vec<_>>(),
        )
    }
}

async fn blocking<T, F>(f: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SyncResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
}

pub(crate) async fn push_blob(
    cache: Arc<dyn BlobCache>,
    remote: Arc<dyn RemoteStore>,
    digest: &Digest,
) -> SyncResult<PushOutcome> {
    let has = {
        let cache = cache.clone();
        let digest = digest.clone();
        blocking(move || Ok(cache.has(&digest)?)).await?
    };
    if !has {
        return Err(SyncError::NotCached {
            blob: digest.blob_ref(),
        });
    }

    if remote.exists(digest).await? {
        debug!(digest = %digest.short_hex(), "remote already has blob");
        return Ok(PushOutcome::AlreadyPresent);
    }

    // One file per blob: hand the path to the remote so it can stream it.
    if let Some(path) = cache.blob_path(digest) {
        let outcome = remote.put_file(digest, &path).await?;
        return Ok(uploaded(digest, outcome, path_size(&path).await?));
    }

    let content = {
        let digest = digest.clone();
        blocking(move || {
            cache
                .get(&digest)?
                .ok_or_else(|| SyncError::NotCached {
                    blob: digest.blob_ref(),
                })
        })
        .await?
    };
    let bytes = content.len() as u64;
    let outcome = remote.put(digest, Bytes::from(content)).await?;
    Ok(uploaded(digest, outcome, bytes))
}

fn uploaded(digest: &Digest, outcome: PutOutcome, bytes: u64) -> PushOutcome {
    match outcome {
        PutOutcome::Stored => {
            debug!(digest = %digest.short_hex(), bytes, "blob uploaded");
            PushOutcome::Uploaded { bytes }
        }
        PutOutcome::AlreadyPresent => PushOutcome::AlreadyPresent,
    }
}

async fn path_size(path: &Path) -> SyncResult<u64> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| SyncError::io(path, e))?;
    Ok(meta.len())
}

pub(crate) async fn pull_blob(
    cache: Arc<dyn BlobCache>,
    remote: Arc<dyn RemoteStore>,
    digest: &Digest,
) -> SyncResult<PullOutcome> {
    let has = {
        let cache = cache.clone();
        let digest = digest.clone();
        blocking(move || Ok(cache.has(&digest)?)).await?
    };
    if has {
        return Ok(PullOutcome::Unchanged);
    }

    let inserted = match cache.scratch_dir() {
        Some(scratch) => pull_streamed(cache, remote.as_ref(), digest, scratch).await?,
        None => {
            let Some(content) = remote.get(digest).await? else {
                return Err(not_on_remote(digest, remote.as_ref()));
            };
            let expected = digest.clone();
            blocking(move || checked(cache.insert(&expected, &content))).await?
        }
    };

    match inserted {
        Ok(put) => {
            debug!(digest = %digest.short_hex(), bytes = put.size, "blob downloaded");
            Ok(PullOutcome::Downloaded { bytes: put.size })
        }
        Err(actual) => Err(SyncError::CorruptRemote {
            blob: digest.blob_ref(),
            remote: remote.describe(),
            actual: actual.blob_ref(),
        }),
    }
}

/// Download into a scratch file next to the cache, then verify it into the
/// cache without holding the blob in memory.
async fn pull_streamed(
    cache: Arc<dyn BlobCache>,
    remote: &dyn RemoteStore,
    digest: &Digest,
    scratch: PathBuf,
) -> SyncResult<Result<CachePut, Digest>> {
    let staged = blocking(move || {
        std::fs::create_dir_all(&scratch).map_err(|e| SyncError::io(&scratch, e))?;
        tempfile::Builder::new()
            .prefix("download-")
            .tempfile_in(&scratch)
            .map_err(|e| SyncError::io(&scratch, e))
    })
    .await?;

    if remote.get_to_file(digest, staged.path()).await?.is_none() {
        return Err(not_on_remote(digest, remote));
    }

    let expected = digest.clone();
    blocking(move || {
        let mut file = staged.reopen().map_err(|e| SyncError::io(staged.path(), e))?;
        checked(cache.insert_reader(&expected, &mut file))
    })
    .await
}

/// Split a digest mismatch out of other cache failures.
fn checked(result: Result<CachePut, CacheError>) -> SyncResult<Result<CachePut, Digest>> {
    match result {
        Ok(put) => Ok(Ok(put)),
        Err(CacheError::DigestMismatch { actual, .. }) => Ok(Err(actual)),
        Err(e) => Err(e.into()),
    }
}

fn not_on_remote(digest: &Digest, remote: &dyn RemoteStore) -> SyncError {
    SyncError::NotOnRemote {
        blob: digest.blob_ref(),
        remote: remote.describe(),
    }
}
