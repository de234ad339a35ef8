use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use quarry_cache::{collect_garbage, BlobCache, DiskCache, GcReport};
use quarry_manifest::{
    discover_pointers, load_pointer, normalize_tracked_path, pointer_path_for, read_pointer,
    remove_pointer, ManifestEntry, StatusReport, Tracked, Tracker, POINTER_EXTENSION,
};
use quarry_remote::{
    open_remote_with_timeout, PutOutcome, RemoteError, RemoteResult, RemoteStore, RetryingRemote,
};
use quarry_sync::{
    CheckoutReport, PullReport, PushReport, SyncEngine, TransferOptions, UnreadablePointer,
};
use quarry_types::{Digest, HashAlgorithm};
use tracing::{debug, info, warn};

use crate::config::{is_not_found, RemoteConfig, RepoConfig};
use crate::error::{SdkError, SdkResult};

/// Name of the per-repository directory.
pub const QUARRY_DIR: &str = ".quarry";
const CONFIG_FILE: &str = "config.toml";
const CACHE_DIR: &str = "cache";

/// A Quarry repository: a working tree with a `.quarry/` directory holding
/// the config and the local blob cache.
///
/// Paths given to its operations may be absolute (under the root) or
/// relative to the root, and may name either an artifact or its pointer file.
pub struct Repository {
    root: PathBuf,
    config: RepoConfig,
    cache: Arc<DiskCache>,
}

impl Repository {
    /// Create `.quarry/` under `root` with a default config and an empty cache.
    pub fn init(root: impl AsRef<Path>) -> SdkResult<Self> {
        let root = root.as_ref().to_path_buf();
        let quarry_dir = root.join(QUARRY_DIR);
        let config_path = quarry_dir.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(SdkError::AlreadyInitialized(root));
        }
        std::fs::create_dir_all(&quarry_dir).map_err(|e| SdkError::io(&quarry_dir, e))?;
        let config = RepoConfig::default();
        config.save(&config_path)?;
        let cache = DiskCache::open(quarry_dir.join(CACHE_DIR))?;
        info!(root = %root.display(), "initialized quarry repository");
        Ok(Self {
            root,
            config,
            cache: Arc::new(cache),
        })
    }

    /// Open the repository rooted exactly at `root`.
    pub fn open(root: impl AsRef<Path>) -> SdkResult<Self> {
        let root = root.as_ref().to_path_buf();
        let quarry_dir = root.join(QUARRY_DIR);
        let config = match RepoConfig::load(&quarry_dir.join(CONFIG_FILE)) {
            Ok(config) => config,
            Err(e) if is_not_found(&e) => return Err(SdkError::NotInitialized(root)),
            Err(e) => return Err(e),
        };
        let cache = DiskCache::open(quarry_dir.join(CACHE_DIR))?;
        Ok(Self {
            root,
            config,
            cache: Arc::new(cache),
        })
    }

    /// Open the nearest repository at or above `start`.
    pub fn discover(start: impl AsRef<Path>) -> SdkResult<Self> {
        let start = start.as_ref();
        for dir in start.ancestors() {
            if dir.join(QUARRY_DIR).join(CONFIG_FILE).is_file() {
                debug!(root = %dir.display(), "found repository");
                return Self::open(dir);
            }
        }
        Err(SdkError::NotInitialized(start.to_path_buf()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<DiskCache> {
        &self.cache
    }

    fn config_path(&self) -> PathBuf {
        self.root.join(QUARRY_DIR).join(CONFIG_FILE)
    }

    fn update_config(&mut self, change: impl FnOnce(&mut RepoConfig) -> SdkResult<()>) -> SdkResult<()> {
        let mut next = self.config.clone();
        change(&mut next)?;
        next.save(&self.config_path())?;
        self.config = next;
        Ok(())
    }

    // ---- Remotes ----

    /// Add or replace a remote. The URL is checked but not contacted.
    pub fn set_remote(&mut self, name: &str, url: &str, token_env: Option<String>) -> SdkResult<()> {
        if name.trim().is_empty() {
            return Err(SdkError::InvalidArgument("remote name is empty".into()));
        }
        open_remote_with_timeout(url, Default::default(), self.config.transfer.timeout())?;
        let remote = RemoteConfig {
            url: url.trim().to_string(),
            token_env,
        };
        self.update_config(|config| {
            config.set_remote(name, remote);
            Ok(())
        })?;
        info!(remote = name, url, "remote configured");
        Ok(())
    }

    pub fn remove_remote(&mut self, name: &str) -> SdkResult<()> {
        self.update_config(|config| {
            if config.remove_remote(name) {
                Ok(())
            } else {
                Err(SdkError::UnknownRemote(name.to_string()))
            }
        })
    }

    /// Open a remote by name (or the default), wrapped in the configured
    /// retry policy. Bare relative mirror paths are taken relative to the
    /// repository root.
    pub fn open_remote(&self, name: Option<&str>) -> SdkResult<Arc<dyn RemoteStore>> {
        let (name, remote) = self.config.resolve_remote(name)?;
        let url = if !remote.url.contains("://") && Path::new(&remote.url).is_relative() {
            self.root.join(&remote.url).display().to_string()
        } else {
            remote.url.clone()
        };
        let store = open_remote_with_timeout(&url, remote.credentials(), self.config.transfer.timeout())?;
        debug!(remote = name, location = %store.describe(), "remote opened");
        Ok(Arc::new(RetryingRemote::new(
            store,
            self.config.transfer.retry_policy(),
        )))
    }

    /// Transfer options from the config, with an optional job override.
    pub fn transfer_options(&self, jobs: Option<usize>) -> TransferOptions {
        TransferOptions::default().with_jobs(jobs.unwrap_or(self.config.transfer.jobs))
    }

    fn engine(&self, remote: Arc<dyn RemoteStore>, options: TransferOptions) -> SyncEngine {
        let cache: Arc<dyn BlobCache> = self.cache.clone();
        SyncEngine::new(cache, remote, options)
    }

    // ---- Tracking ----

    /// Track one artifact with the configured algorithm.
    pub fn track(&self, path: &Path) -> SdkResult<Tracked> {
        let tracker = Tracker::new(&self.root, self.cache.as_ref(), self.config.core.algorithm)?;
        Ok(tracker.track(path)?)
    }

    /// Delete an artifact's pointer file. Blobs stay in the cache and on
    /// remotes. Returns the tracked path.
    pub fn untrack(&self, path: &Path) -> SdkResult<String> {
        let tracked = self.tracked_path(path)?;
        if !remove_pointer(&self.root, &tracked)? {
            return Err(SdkError::InvalidArgument(format!("{tracked} is not tracked")));
        }
        info!(path = %tracked, "untracked");
        Ok(tracked)
    }

    fn tracked_path(&self, path: &Path) -> SdkResult<String> {
        let artifact = if path.extension().and_then(|e| e.to_str()) == Some(POINTER_EXTENSION) {
            path.with_extension("")
        } else {
            path.to_path_buf()
        };
        Ok(normalize_tracked_path(&self.root, &artifact)?)
    }

    /// Pointer file location for an artifact or pointer path.
    pub fn pointer_for(&self, path: &Path) -> SdkResult<PathBuf> {
        Ok(pointer_path_for(&self.root, &self.tracked_path(path)?))
    }

    fn pointers(&self, paths: &[PathBuf]) -> SdkResult<Vec<PathBuf>> {
        if paths.is_empty() {
            Ok(discover_pointers(&self.root)?)
        } else {
            paths.iter().map(|p| self.pointer_for(p)).collect()
        }
    }

    /// Read the entries named by `paths`, or every pointer file in the
    /// working tree when `paths` is empty. Any unreadable pointer is an error.
    pub fn entries(&self, paths: &[PathBuf]) -> SdkResult<Vec<ManifestEntry>> {
        let entries = self
            .pointers(paths)?
            .iter()
            .map(|p| load_pointer(&self.root, p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries for a transfer batch. A pointer that cannot be read is set
    /// aside and reported with the batch instead of stopping it.
    fn select(&self, paths: &[PathBuf]) -> SdkResult<(Vec<ManifestEntry>, Vec<UnreadablePointer>)> {
        let mut entries = Vec::new();
        let mut unreadable = Vec::new();
        for pointer in self.pointers(paths)? {
            match load_pointer(&self.root, &pointer) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(pointer = %pointer.display(), error = %e, "skipping unreadable pointer");
                    unreadable.push(UnreadablePointer::new(pointer, e));
                }
            }
        }
        Ok((entries, unreadable))
    }

    // ---- Status and transfer ----

    pub fn status(&self, paths: &[PathBuf]) -> SdkResult<StatusReport> {
        let entries = self.entries(paths)?;
        Ok(StatusReport::compute(&self.root, &entries)?)
    }

    pub async fn push(
        &self,
        paths: &[PathBuf],
        remote: Option<&str>,
        options: TransferOptions,
    ) -> SdkResult<PushReport> {
        let (entries, unreadable) = self.select(paths)?;
        let engine = self.engine(self.open_remote(remote)?, options);
        Ok(engine.push(&entries).await.with_unreadable(unreadable))
    }

    pub async fn pull(
        &self,
        paths: &[PathBuf],
        remote: Option<&str>,
        options: TransferOptions,
    ) -> SdkResult<PullReport> {
        let (entries, unreadable) = self.select(paths)?;
        let engine = self.engine(self.open_remote(remote)?, options);
        Ok(engine.pull(&entries).await.with_unreadable(unreadable))
    }

    /// Restore working files. Without any configured remote, checkout still
    /// works from the cache and reports uncached blobs as unavailable.
    pub async fn checkout(
        &self,
        paths: &[PathBuf],
        remote: Option<&str>,
        options: TransferOptions,
    ) -> SdkResult<CheckoutReport> {
        let (entries, unreadable) = self.select(paths)?;
        let store = match self.open_remote(remote) {
            Ok(store) => store,
            Err(SdkError::NoRemote) => Arc::new(NoRemote),
            Err(e) => return Err(e),
        };
        let engine = self.engine(store, options);
        Ok(engine
            .checkout(&self.root, &entries)
            .await
            .with_unreadable(unreadable))
    }

    // ---- Maintenance ----

    /// Remove cached blobs not referenced by any pointer file in the working
    /// tree or by the extra pointer files in `keep` (for example pointers
    /// exported from older commits).
    pub fn gc(&self, dry_run: bool, keep: &[PathBuf]) -> SdkResult<GcReport> {
        let mut reachable: HashSet<Digest> = self
            .entries(&[])?
            .into_iter()
            .map(|entry| entry.digest)
            .collect();
        for pointer in keep {
            reachable.insert(read_pointer(pointer)?.digest);
        }
        Ok(collect_garbage(self.cache.as_ref(), &reachable, dry_run)?)
    }
}

/// Stand-in remote for checkout when none is configured: holds nothing and
/// accepts nothing.
struct NoRemote;

const NO_REMOTE: &str = "(no remote configured)";

#[async_trait]
impl RemoteStore for NoRemote {
    async fn put(&self, _digest: &Digest, _content: Bytes) -> RemoteResult<PutOutcome> {
        Err(RemoteError::Rejected {
            backend: NO_REMOTE.into(),
            reason: "no remote configured".into(),
        })
    }

    async fn get(&self, _digest: &Digest) -> RemoteResult<Option<Bytes>> {
        Ok(None)
    }

    async fn exists(&self, _digest: &Digest) -> RemoteResult<bool> {
        Ok(false)
    }

    async fn list(&self, _algorithm: HashAlgorithm, _hex_prefix: &str) -> RemoteResult<Vec<Digest>> {
        Ok(Vec::new())
    }

    fn describe(&self) -> String {
        NO_REMOTE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_manifest::EntryStatus;
    use quarry_sync::{CheckoutOutcome, PullOutcome, PushOutcome};
    use quarry_types::ErrorClass;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        mirror: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("work");
            let mirror = dir.path().join("mirror");
            fs::create_dir_all(&root).unwrap();
            Self {
                _dir: dir,
                root,
                mirror,
            }
        }

        fn write(&self, path: &str, content: &[u8]) {
            let full = self.root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }

        fn repo_with_remote(&self) -> Repository {
            let mut repo = Repository::init(&self.root).unwrap();
            repo.set_remote("origin", self.mirror.to_str().unwrap(), None)
                .unwrap();
            repo
        }
    }

    fn options() -> TransferOptions {
        TransferOptions::default().with_jobs(2)
    }

    #[test]
    fn init_creates_layout() {
        let fx = Fixture::new();
        let repo = Repository::init(&fx.root).unwrap();
        assert!(fx.root.join(".quarry/config.toml").is_file());
        assert!(fx.root.join(".quarry/cache").is_dir());
        assert_eq!(repo.config(), &RepoConfig::default());

        let err = Repository::init(&fx.root).err().unwrap();
        assert!(matches!(err, SdkError::AlreadyInitialized(_)));
    }

    #[test]
    fn open_requires_init() {
        let fx = Fixture::new();
        let err = Repository::open(&fx.root).err().unwrap();
        assert!(matches!(err, SdkError::NotInitialized(_)));
        assert_eq!(err.class(), ErrorClass::Argument);
    }

    #[test]
    fn discover_walks_up() {
        let fx = Fixture::new();
        Repository::init(&fx.root).unwrap();
        let nested = fx.root.join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let repo = Repository::discover(&nested).unwrap();
        assert_eq!(repo.root(), fx.root.as_path());
    }

    #[test]
    fn pointer_and_artifact_paths_agree() {
        let fx = Fixture::new();
        let repo = Repository::init(&fx.root).unwrap();
        let from_artifact = repo.pointer_for(Path::new("data/train.csv")).unwrap();
        let from_pointer = repo.pointer_for(Path::new("data/train.csv.qp")).unwrap();
        let absolute = repo.pointer_for(&fx.root.join("data/train.csv")).unwrap();
        assert_eq!(from_artifact, fx.root.join("data/train.csv.qp"));
        assert_eq!(from_artifact, from_pointer);
        assert_eq!(from_artifact, absolute);
    }

    #[test]
    fn track_status_untrack() {
        let fx = Fixture::new();
        let repo = Repository::init(&fx.root).unwrap();
        fx.write("data/a.bin", b"alpha");
        fx.write("data/b.bin", b"beta");
        repo.track(Path::new("data/a.bin")).unwrap();
        repo.track(Path::new("data/b.bin")).unwrap();

        let report = repo.status(&[]).unwrap();
        assert_eq!(report.entries.len(), 2);
        assert!(report.is_clean());

        fx.write("data/a.bin", b"ALPHA!");
        fs::remove_file(fx.root.join("data/b.bin")).unwrap();
        let report = repo.status(&[]).unwrap();
        assert_eq!(report.count(EntryStatus::Modified), 1);
        assert_eq!(report.count(EntryStatus::Missing), 1);

        assert_eq!(repo.untrack(Path::new("data/b.bin.qp")).unwrap(), "data/b.bin");
        assert_eq!(repo.entries(&[]).unwrap().len(), 1);
        let err = repo.untrack(Path::new("data/b.bin")).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Argument);
    }

    #[test]
    fn unknown_paths_are_argument_errors() {
        let fx = Fixture::new();
        let repo = Repository::init(&fx.root).unwrap();
        let err = repo.entries(&[PathBuf::from("nope.csv")]).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Argument);
        let err = repo.track(Path::new("../outside")).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Argument);
    }

    #[test]
    fn remote_management_persists() {
        let fx = Fixture::new();
        let mut repo = Repository::init(&fx.root).unwrap();
        repo.set_remote("origin", "https://objects.example/q", Some("ORIGIN_TOKEN".into()))
            .unwrap();
        repo.set_remote("backup", "file:///srv/quarry", None).unwrap();

        let reopened = Repository::open(&fx.root).unwrap();
        assert_eq!(reopened.config().remotes.len(), 2);
        assert_eq!(reopened.config().core.remote.as_deref(), Some("origin"));

        let err = repo.set_remote("bad", "ftp://x", None).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Argument);

        repo.remove_remote("origin").unwrap();
        assert!(matches!(
            repo.remove_remote("origin"),
            Err(SdkError::UnknownRemote(_))
        ));
        let reopened = Repository::open(&fx.root).unwrap();
        assert!(reopened.config().core.remote.is_none());
        assert_eq!(reopened.config().remotes.len(), 1);
    }

    #[tokio::test]
    async fn push_requires_a_remote() {
        let fx = Fixture::new();
        let repo = Repository::init(&fx.root).unwrap();
        fx.write("a.bin", b"x");
        repo.track(Path::new("a.bin")).unwrap();
        let err = repo.push(&[], None, options()).await.unwrap_err();
        assert!(matches!(err, SdkError::NoRemote));
    }

    #[tokio::test]
    async fn full_round_trip_through_mirror() {
        let fx = Fixture::new();
        let repo = fx.repo_with_remote();
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fx.write("models/weights.bin", &content);
        repo.track(Path::new("models/weights.bin")).unwrap();

        let pushed = repo.push(&[], None, options()).await.unwrap();
        assert!(pushed.is_success());
        assert!(matches!(pushed.entries[0].outcome, PushOutcome::Uploaded { .. }));

        let again = repo.push(&[], None, options()).await.unwrap();
        assert!(matches!(again.entries[0].outcome, PushOutcome::AlreadyPresent));

        // Drop the cache and the working file, then restore from the remote.
        drop(repo);
        fs::remove_dir_all(fx.root.join(".quarry/cache")).unwrap();
        fs::remove_file(fx.root.join("models/weights.bin")).unwrap();
        let repo = Repository::open(&fx.root).unwrap();

        let pulled = repo.pull(&[], None, options()).await.unwrap();
        assert!(matches!(pulled.entries[0].outcome, PullOutcome::Downloaded { .. }));

        let restored = repo.checkout(&[], None, options()).await.unwrap();
        assert!(matches!(
            restored.entries[0].outcome,
            CheckoutOutcome::Restored { pulled: false, .. }
        ));
        assert_eq!(fs::read(fx.root.join("models/weights.bin")).unwrap(), content);

        let noop = repo.checkout(&[], None, options()).await.unwrap();
        assert!(matches!(noop.entries[0].outcome, CheckoutOutcome::AlreadyUpToDate));
    }

    #[tokio::test]
    async fn checkout_without_remote_uses_cache() {
        let fx = Fixture::new();
        let repo = Repository::init(&fx.root).unwrap();
        fx.write("a.bin", b"cached");
        repo.track(Path::new("a.bin")).unwrap();
        fs::remove_file(fx.root.join("a.bin")).unwrap();

        let report = repo.checkout(&[], None, options()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(fs::read(fx.root.join("a.bin")).unwrap(), b"cached");

        // Evict the blob: now nothing can supply it.
        let entry = repo.entries(&[]).unwrap().remove(0);
        repo.cache().remove(&entry.digest).unwrap();
        fs::remove_file(fx.root.join("a.bin")).unwrap();
        let report = repo.checkout(&[], None, options()).await.unwrap();
        assert_eq!(report.worst_class(), Some(ErrorClass::BlobUnavailable));
    }

    #[tokio::test]
    async fn moved_pointer_checks_out_at_its_new_location() {
        let fx = Fixture::new();
        let repo = Repository::init(&fx.root).unwrap();
        fx.write("a.bin", b"renamed with its pointer");
        repo.track(Path::new("a.bin")).unwrap();

        fs::create_dir_all(fx.root.join("moved")).unwrap();
        fs::rename(fx.root.join("a.bin"), fx.root.join("moved/a.bin")).unwrap();
        fs::rename(fx.root.join("a.bin.qp"), fx.root.join("moved/a.bin.qp")).unwrap();
        fs::remove_file(fx.root.join("moved/a.bin")).unwrap();

        let target = [PathBuf::from("moved/a.bin")];
        let status = repo.status(&target).unwrap();
        assert_eq!(status.entries[0].0.path, "moved/a.bin");
        assert_eq!(status.entries[0].1, EntryStatus::Missing);

        let report = repo.checkout(&target, None, options()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(fs::read(fx.root.join("moved/a.bin")).unwrap(), b"renamed with its pointer");
        assert!(!fx.root.join("a.bin").exists());
    }

    #[tokio::test]
    async fn unreadable_pointer_does_not_stop_the_batch() {
        let fx = Fixture::new();
        let repo = fx.repo_with_remote();
        for i in 0..3 {
            fx.write(&format!("part-{i}.bin"), format!("part {i}").as_bytes());
            repo.track(Path::new(&format!("part-{i}.bin"))).unwrap();
        }
        assert!(repo.push(&[], None, options()).await.unwrap().is_success());

        fx.write("broken.bin.qp", b"algorithm = \"blake3\"\nsize = 1\npath = \"broken.bin\"\n");
        for digest in repo.cache().list().unwrap() {
            repo.cache().remove(&digest).unwrap();
        }

        let report = repo.pull(&[], None, options()).await.unwrap();
        assert_eq!(report.count("downloaded"), 3);
        assert_eq!(report.unreadable.len(), 1);
        assert_eq!(report.unreadable[0].pointer, fx.root.join("broken.bin.qp"));
        assert_eq!(report.worst_class(), Some(ErrorClass::ManifestCorrupt));
        assert_eq!(repo.cache().list().unwrap().len(), 3);

        // Strict reads still refuse the tree.
        let err = repo.entries(&[]).unwrap_err();
        assert_eq!(err.class(), ErrorClass::ManifestCorrupt);
    }

    #[tokio::test]
    async fn relative_mirror_paths_resolve_against_root() {
        let fx = Fixture::new();
        let mut repo = Repository::init(&fx.root).unwrap();
        repo.set_remote("local", "../mirror", None).unwrap();
        fx.write("a.bin", b"relative");
        repo.track(Path::new("a.bin")).unwrap();
        let report = repo.push(&[], Some("local"), options()).await.unwrap();
        assert!(report.is_success());
        let entry = repo.entries(&[]).unwrap().remove(0);
        assert!(fx.mirror.join(entry.digest.shard_path()).is_file());
    }

    #[test]
    fn gc_keeps_referenced_blobs() {
        let fx = Fixture::new();
        let repo = Repository::init(&fx.root).unwrap();
        fx.write("a.bin", b"version one");
        repo.track(Path::new("a.bin")).unwrap();
        let old_pointer = fx.root.join("a.bin.qp");
        let kept = fx.root.join("..").join("kept.qp");
        fs::copy(&old_pointer, &kept).unwrap();

        fx.write("a.bin", b"version two");
        repo.track(Path::new("a.bin")).unwrap();
        fx.write("b.bin", b"orphan");
        let orphan = repo.track(Path::new("b.bin")).unwrap();
        repo.untrack(Path::new("b.bin")).unwrap();

        let dry = repo.gc(true, &[kept.clone()]).unwrap();
        assert_eq!(dry.removed, vec![orphan.entry.digest.clone()]);
        assert!(repo.cache().has(&orphan.entry.digest).unwrap());

        let report = repo.gc(false, &[kept]).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.bytes_freed, 6);
        assert_eq!(repo.cache().list().unwrap().len(), 2);
    }
}
