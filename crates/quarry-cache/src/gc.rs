use std::collections::HashSet;
use std::fs;
use std::io;
use std::time::{Duration, SystemTime};

use quarry_types::Digest;
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult};
use crate::traits::BlobCache;

/// Staging files older than this are leftovers of an interrupted write.
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

/// Result of a garbage-collection pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Blobs inspected.
    pub scanned: usize,
    /// Blobs removed (or that would be removed, on a dry run).
    pub removed: Vec<Digest>,
    /// Stale staging files removed.
    pub stale_staging: usize,
    /// Bytes reclaimed, staging files included.
    pub bytes_freed: u64,
    pub dry_run: bool,
}

/// Remove every cached blob whose digest is not in `reachable`.
///
/// The caller is responsible for building `reachable` from every manifest
/// version it wants to keep restorable, including historical versions held
/// by the primary VCS. Anything left out is deleted.
pub fn collect_garbage(
    cache: &dyn BlobCache,
    reachable: &HashSet<Digest>,
    dry_run: bool,
) -> CacheResult<GcReport> {
    let mut report = GcReport {
        dry_run,
        ..GcReport::default()
    };

    for digest in cache.list()? {
        report.scanned += 1;
        if reachable.contains(&digest) {
            continue;
        }
        let size = cache.blob_size(&digest)?.unwrap_or(0);
        if dry_run || cache.remove(&digest)? {
            report.bytes_freed += size;
            report.removed.push(digest);
        }
    }

    let (stale, stale_bytes) = sweep_staging(cache, STALE_STAGING_AGE, dry_run)?;
    report.stale_staging = stale;
    report.bytes_freed += stale_bytes;

    info!(
        scanned = report.scanned,
        removed = report.removed.len(),
        stale_staging = report.stale_staging,
        bytes_freed = report.bytes_freed,
        dry_run,
        "cache garbage collection finished"
    );
    Ok(report)
}

/// Delete files in the cache's scratch directory last modified at least
/// `older_than` ago. Returns how many were (or would be) removed and their
/// total size.
pub fn sweep_staging(
    cache: &dyn BlobCache,
    older_than: Duration,
    dry_run: bool,
) -> CacheResult<(usize, u64)> {
    let Some(dir) = cache.scratch_dir() else {
        return Ok((0, 0));
    };
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(CacheError::at(&dir, e)),
    };

    let now = SystemTime::now();
    let (mut count, mut bytes) = (0, 0);
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::at(&dir, e))?;
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(CacheError::at(&path, e)),
        };
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < older_than {
            continue;
        }
        if !dry_run {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::at(&path, e)),
            }
        }
        debug!(path = %path.display(), age_secs = age.as_secs(), dry_run, "stale staging file");
        count += 1;
        bytes += meta.len();
    }
    Ok((count, bytes))
}
