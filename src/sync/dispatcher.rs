//! Concurrency-bounded per-record dispatch
//!
//! Runs one operation per record with at most `concurrency` operations in
//! flight. A permit is taken before each task is spawned, so the number of
//! live tasks never exceeds the limit. Per-record failures are collected into
//! the summary and never affect sibling records.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use crate::models::{Campaign, RecordFailure, SyncOutcome, SyncSummary};

/// Bounded worker pool for per-record operations
#[derive(Debug, Clone)]
pub struct ConcurrencyDispatcher {
    concurrency: usize,
    cancel: CancellationToken,
}

impl ConcurrencyDispatcher {
    /// Create a dispatcher allowing `concurrency` operations in flight
    pub fn new(concurrency: usize) -> Self {
        Self::with_cancellation(concurrency, CancellationToken::new())
    }

    /// Create a dispatcher that stops when `cancel` fires
    pub fn with_cancellation(concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Concurrency limit
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `operation` for every record and aggregate the outcomes
    ///
    /// On cancellation no further records are started and are counted as
    /// skipped; records in flight finish as `Cancelled` failures. Every spawned
    /// task is joined before returning.
    pub async fn run<F, Fut>(
        &self,
        records: Vec<Campaign>,
        operation: F,
    ) -> Result<SyncSummary, DispatchError>
    where
        F: Fn(Campaign) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RecordFailure>> + Send + 'static,
    {
        let started = Instant::now();
        let total = records.len();
        let operation = Arc::new(operation);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<SyncOutcome> = JoinSet::new();
        let mut outcomes = Vec::with_capacity(total);
        let mut skipped = 0usize;

        debug!(records = total, concurrency = self.concurrency, "Dispatching records");

        let mut pending = records.into_iter();
        while let Some(record) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    skipped = 1 + pending.len();
                    warn!(skipped, "Dispatch cancelled, remaining records skipped");
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        skipped = 1 + pending.len();
                        error!(skipped, "Semaphore closed unexpectedly");
                        break;
                    }
                },
            };

            let operation = Arc::clone(&operation);
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let record_id = record.id.clone();
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(RecordFailure::cancelled()),
                    result = operation(record) => result,
                };
                match result {
                    Ok(()) => SyncOutcome::succeeded(record_id),
                    Err(failure) => SyncOutcome::failed(record_id, failure),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome.failure {
                        Some(failure) => warn!(
                            campaign_id = %outcome.record_id,
                            kind = %failure.kind,
                            error = %failure.message,
                            "Campaign sync failed"
                        ),
                        None => debug!(campaign_id = %outcome.record_id, "Campaign synced"),
                    }
                    outcomes.push(outcome);
                }
                // Tasks are never aborted one by one, so any join error is a defect.
                Err(join_error) => {
                    error!(error = %join_error, "Worker failed, aborting dispatch");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(DispatchError::WorkerPanicked(join_error.to_string()));
                }
            }
        }

        let mut summary = SyncSummary::from_outcomes(&outcomes, skipped);
        summary.elapsed = started.elapsed();
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Dispatch complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn records(n: usize) -> Vec<Campaign> {
        (1..=n)
            .map(|i| Campaign::new(format!("cmp-{:03}", i), format!("Campaign {}", i)))
            .collect()
    }

    // Test 1: No more than the limit run at once, and all eventually complete
    #[tokio::test]
    async fn test_bounded_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let dispatcher = ConcurrencyDispatcher::new(3);
        let op = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let gate = Arc::clone(&gate);
            move |_record: Campaign| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                let gate = Arc::clone(&gate);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let _ = gate.acquire().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), RecordFailure>(())
                }
            }
        };

        let handle = tokio::spawn(async move { dispatcher.run(records(10), op).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(in_flight.load(Ordering::SeqCst), 3);

        gate.add_permits(10);
        let summary = handle.await.unwrap().unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(summary.total, 10);
        assert_eq!(summary.succeeded, 10);
        assert_eq!(summary.failed, 0);
    }

    // Test 2: One failing record does not affect its siblings
    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let dispatcher = ConcurrencyDispatcher::new(3);
        let summary = dispatcher
            .run(records(5), |record: Campaign| async move {
                if record.id == "cmp-003" {
                    Err(RecordFailure::new(FailureKind::ServerError, "HTTP 503"))
                } else {
                    Ok::<(), RecordFailure>(())
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].record_id, "cmp-003");
        assert_eq!(summary.failures[0].kind, FailureKind::ServerError);
    }

    // Test 3: Empty input produces an empty summary
    #[tokio::test]
    async fn test_empty_records() {
        let dispatcher = ConcurrencyDispatcher::new(3);
        let summary = dispatcher
            .run(Vec::new(), |_record: Campaign| async { Ok::<(), RecordFailure>(()) })
            .await
            .unwrap();

        assert_eq!(summary.total, 0);
        assert!(summary.is_healthy());
    }

    // Test 4: A panicking worker aborts the dispatch
    #[tokio::test]
    async fn test_worker_panic_is_dispatch_error() {
        let dispatcher = ConcurrencyDispatcher::new(2);
        let result = dispatcher
            .run(records(4), |record: Campaign| async move {
                if record.id == "cmp-002" {
                    panic!("worker bug");
                }
                Ok::<(), RecordFailure>(())
            })
            .await;

        assert!(matches!(result, Err(DispatchError::WorkerPanicked(_))));
    }

    // Test 5: Cancelling before the run skips every record
    #[tokio::test]
    async fn test_cancel_before_run_skips_all() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let dispatcher = ConcurrencyDispatcher::with_cancellation(3, cancel);
        let summary = dispatcher
            .run(records(5), move |_record: Campaign| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), RecordFailure>(())
                }
            })
            .await
            .unwrap();

        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.skipped, 5);
        assert!(!summary.is_healthy());
    }

    // Test 6: Cancelling mid-run cancels in-flight work and skips the rest
    #[tokio::test]
    async fn test_cancel_mid_run() {
        let cancel = CancellationToken::new();
        let dispatcher = ConcurrencyDispatcher::with_cancellation(2, cancel.clone());

        let handle = tokio::spawn(async move {
            dispatcher
                .run(records(6), |_record: Campaign| async {
                    std::future::pending::<()>().await;
                    Ok::<(), RecordFailure>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let summary = handle.await.unwrap().unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 4);
        assert!(summary
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::Cancelled));
    }

    // Test 7: Zero concurrency is clamped to one
    #[test]
    fn test_concurrency_clamped() {
        assert_eq!(ConcurrencyDispatcher::new(0).concurrency(), 1);
        assert_eq!(ConcurrencyDispatcher::new(8).concurrency(), 8);
    }
}
