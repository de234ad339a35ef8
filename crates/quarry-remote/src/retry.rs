//! Retry-with-backoff decorator for any [`RemoteStore`].

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use quarry_types::{Digest, HashAlgorithm};
use rand::Rng;
use tracing::{debug, warn};

use crate::error::RemoteResult;
use crate::traits::{PutOutcome, RemoteStore};

/// Bounded exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// The exponential delay is capped at `max_delay`, then jittered to a
    /// random point in its upper half so that parallel workers spread out.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(32)).min(cap);
        let jittered = rand::thread_rng().gen_range(exp / 2..=exp);
        Duration::from_millis(jittered)
    }
}

/// Wraps a remote and retries transient failures.
///
/// Permanent errors are returned immediately. When retries run out the last
/// error is returned unchanged.
pub struct RetryingRemote<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: RemoteStore> RetryingRemote<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> RemoteResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = RemoteResult<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, retries = attempt, "remote call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        operation,
                        remote = %self.inner.describe(),
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient remote failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<R: RemoteStore> RemoteStore for RetryingRemote<R> {
    async fn put(&self, digest: &Digest, content: Bytes) -> RemoteResult<PutOutcome> {
        self.run("put", || self.inner.put(digest, content.clone())).await
    }

    async fn get(&self, digest: &Digest) -> RemoteResult<Option<Bytes>> {
        self.run("get", || self.inner.get(digest)).await
    }

    async fn exists(&self, digest: &Digest) -> RemoteResult<bool> {
        self.run("exists", || self.inner.exists(digest)).await
    }

    async fn list(&self, algorithm: HashAlgorithm, hex_prefix: &str) -> RemoteResult<Vec<Digest>> {
        self.run("list", || self.inner.list(algorithm, hex_prefix)).await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn put_file(&self, digest: &Digest, source: &Path) -> RemoteResult<PutOutcome> {
        self.run("put", || self.inner.put_file(digest, source)).await
    }

    async fn get_to_file(&self, digest: &Digest, target: &Path) -> RemoteResult<Option<u64>> {
        self.run("get", || self.inner.get_to_file(digest, target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::memory::InMemoryRemote;
    use quarry_crypto::ContentHasher;
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        for attempt in 0..10 {
            let exp = (100u64 << attempt).min(1000);
            let d = policy.delay_for(attempt).as_millis() as u64;
            assert!(d >= exp / 2 && d <= exp, "attempt {attempt}: {d}ms");
        }
        assert!(policy.delay_for(200) <= Duration::from_millis(1000));
    }

    #[test]
    fn zero_base_delay_is_zero() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(3), Duration::ZERO);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let inner = Arc::new(InMemoryRemote::new());
        inner.fail_next(2);
        let remote = RetryingRemote::new(inner.clone(), fast_policy(3));

        let d = ContentHasher::hash(HashAlgorithm::Blake3, b"data");
        let outcome = remote.put(&d, Bytes::from_static(b"data")).await.unwrap();
        assert_eq!(outcome, PutOutcome::Stored);
        assert_eq!(inner.put_calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let inner = Arc::new(InMemoryRemote::new());
        inner.fail_next(10);
        let remote = RetryingRemote::new(inner.clone(), fast_policy(2));

        let d = ContentHasher::hash(HashAlgorithm::Blake3, b"data");
        let err = remote.exists(&d).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(inner.exists_calls(), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let inner = Arc::new(InMemoryRemote::new());
        let remote = RetryingRemote::new(inner.clone(), fast_policy(5));

        let d = ContentHasher::hash(HashAlgorithm::Blake3, b"data");
        let err = remote.put(&d, Bytes::from_static(b"other")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { .. }));
        assert_eq!(inner.put_calls(), 1);
    }
}
