//! Bounded-concurrency batch execution shared by every pipeline phase.

use std::future::Future;

use futures_util::{StreamExt, TryStreamExt};
use indicatif::ProgressBar;

use crate::error::{Error, Result};

/// Worker count for network downloads.
pub const DOWNLOAD_WORKERS: usize = 4;

/// Worker count for extraction and recompression.
pub fn cpu_workers() -> usize {
    num_cpus::get().max(1)
}

/// Run `f` over every job with at most `workers` jobs in flight.
///
/// Each job runs on its own tokio task. Outputs are returned in completion
/// order. The first error ends the batch: no further jobs are dispatched, and
/// jobs already in flight are left to finish in the background with their
/// results discarded.
pub async fn run_jobs<J, T, F, Fut>(
    jobs: impl IntoIterator<Item = J>,
    workers: usize,
    progress: &ProgressBar,
    f: F,
) -> Result<Vec<T>>
where
    F: Fn(J) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    futures_util::stream::iter(jobs)
        .map(|job| {
            let handle = tokio::spawn(f(job));
            async move { handle.await.map_err(Error::from)? }
        })
        .buffer_unordered(workers.max(1))
        .inspect_ok(|_| progress.inc(1))
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_collects_all_outputs() {
        let pb = ProgressBar::hidden();
        let mut out = run_jobs(0..10u32, 3, &pb, |n| async move { Ok::<_, Error>(n * 2) })
            .await
            .unwrap();
        out.sort();
        assert_eq!(out, (0..10).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(pb.position(), 10);
    }

    #[tokio::test]
    async fn test_respects_worker_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pb = ProgressBar::hidden();
        run_jobs(0..16, 4, &pb, |_| {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, Error>(())
            }
        })
        .await
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_first_error_stops_dispatch() {
        let started = Arc::new(AtomicUsize::new(0));
        let pb = ProgressBar::hidden();
        let result = run_jobs(0..100, 1, &pb, |n| {
            let started = started.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if n == 2 {
                    Err(Error::NoContent)
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(matches!(result, Err(Error::NoContent)));
        assert!(started.load(Ordering::SeqCst) < 100);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pb = ProgressBar::hidden();
        let out: Vec<()> = run_jobs(Vec::<u8>::new(), 4, &pb, |_| async { Ok::<_, Error>(()) })
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
