//! Bounded worker pool shared by every batch operation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::SyncError;
use crate::types::Outcome;

/// Run `work` over `items` with at most `jobs` tasks in flight.
///
/// Results come back in input order. Items that have not started when
/// `cancel` fires report [`SyncError::Cancelled`]; items already running are
/// left to finish.
pub(crate) async fn run_batch<I, O, F, Fut>(
    items: Vec<I>,
    jobs: usize,
    cancel: &CancellationToken,
    work: F,
) -> Vec<O>
where
    I: Send + 'static,
    O: Outcome,
    F: Fn(I) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let mut results: Vec<Option<O>> = (0..items.len()).map(|_| None).collect();
    let mut tasks = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            results[index] = Some(O::failed(SyncError::Cancelled));
            continue;
        };
        let task = work(item);
        tasks.spawn(async move {
            let _permit = permit;
            (index, task.await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => results[index] = Some(outcome),
            Err(e) => error!(error = %e, "transfer task failed"),
        }
    }

    let skipped = results.iter().filter(|r| r.is_none()).count();
    if skipped > 0 {
        debug!(skipped, "filling results for tasks that did not complete");
    }
    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| O::failed(SyncError::Task("task panicked or was aborted".into()))))
        .collect()
}
