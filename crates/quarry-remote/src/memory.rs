//! In-memory remote with call counters and fault injection, for tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use quarry_crypto::ContentHasher;
use quarry_types::{Digest, HashAlgorithm};

use crate::error::{RemoteError, RemoteResult};
use crate::traits::{is_valid_prefix, PutOutcome, RemoteStore};

const BACKEND: &str = "memory";

#[derive(Default)]
struct Faults {
    fail_next: u32,
    withheld: HashSet<Digest>,
    latency: Option<Duration>,
}

/// Remote store held in memory.
///
/// Counts calls per operation and can be told to fail, to hide objects, or to
/// hold corrupted bytes, so sync behaviour can be tested without a network.
#[derive(Default)]
pub struct InMemoryRemote {
    objects: RwLock<BTreeMap<Digest, Bytes>>,
    faults: Mutex<Faults>,
    puts: AtomicUsize,
    stored: AtomicUsize,
    gets: AtomicUsize,
    exists_calls: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects held.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.objects.read().expect("lock poisoned").contains_key(digest)
    }

    /// `put` calls received, including no-ops and failures.
    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Objects actually written.
    pub fn stored_count(&self) -> usize {
        self.stored.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    /// Make the next `n` calls of any kind fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.faults.lock().expect("lock poisoned").fail_next = n;
    }

    /// Pretend the store does not hold `digest`.
    pub fn withhold(&self, digest: &Digest) {
        self.faults
            .lock()
            .expect("lock poisoned")
            .withheld
            .insert(digest.clone());
    }

    /// Store arbitrary bytes under `digest` without verifying them.
    pub fn insert_raw(&self, digest: &Digest, content: impl Into<Bytes>) {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(digest.clone(), content.into());
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().expect("lock poisoned").latency = Some(latency);
    }

    /// Apply injected latency and failures before a call.
    async fn before_call(&self) -> RemoteResult<()> {
        let (latency, fail) = {
            let mut faults = self.faults.lock().expect("lock poisoned");
            let fail = faults.fail_next > 0;
            if fail {
                faults.fail_next -= 1;
            }
            (faults.latency, fail)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(RemoteError::Status {
                backend: BACKEND.into(),
                status: 503,
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn is_withheld(&self, digest: &Digest) -> bool {
        self.faults.lock().expect("lock poisoned").withheld.contains(digest)
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn put(&self, digest: &Digest, content: Bytes) -> RemoteResult<PutOutcome> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        if ContentHasher::hash(digest.algorithm(), &content) != *digest {
            return Err(RemoteError::Rejected {
                backend: BACKEND.into(),
                reason: format!("content does not hash to {}", digest.blob_ref()),
            });
        }
        let mut objects = self.objects.write().expect("lock poisoned");
        if objects.contains_key(digest) {
            return Ok(PutOutcome::AlreadyPresent);
        }
        objects.insert(digest.clone(), content);
        self.stored.fetch_add(1, Ordering::SeqCst);
        Ok(PutOutcome::Stored)
    }

    async fn get(&self, digest: &Digest) -> RemoteResult<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        if self.is_withheld(digest) {
            return Ok(None);
        }
        Ok(self.objects.read().expect("lock poisoned").get(digest).cloned())
    }

    async fn exists(&self, digest: &Digest) -> RemoteResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        if self.is_withheld(digest) {
            return Ok(false);
        }
        Ok(self.contains(digest))
    }

    async fn list(&self, algorithm: HashAlgorithm, hex_prefix: &str) -> RemoteResult<Vec<Digest>> {
        if !is_valid_prefix(algorithm, hex_prefix) {
            return Err(RemoteError::InvalidPrefix(hex_prefix.to_string()));
        }
        self.before_call().await?;
        let objects = self.objects.read().expect("lock poisoned");
        Ok(objects
            .keys()
            .filter(|d| d.algorithm() == algorithm && d.to_hex().starts_with(hex_prefix))
            .filter(|d| !self.is_withheld(d))
            .cloned()
            .collect())
    }

    fn describe(&self) -> String {
        format!("{BACKEND}://")
    }
}
