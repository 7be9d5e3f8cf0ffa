//! Sync run state machine
//!
//! [`SyncOrchestrator`] drives one run through
//! `Idle → Authenticating → Paginating → Dispatching → Summarizing → Done`.
//! Authentication and pagination failures are fatal and end in `Failed`;
//! per-record failures are collected into the [`SyncSummary`].

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::database::CampaignRepository;
use crate::error::{PaginationError, SyncRunError};
use crate::models::{Campaign, FailureKind, RecordFailure, SyncSummary};
use crate::otel::SyncMetrics;
use crate::sync::api::CampaignSource;
use crate::sync::dispatcher::ConcurrencyDispatcher;
use crate::sync::pagination::PaginationDriver;

/// Phase of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// Not running
    #[default]
    Idle,
    /// Obtaining a bearer token
    Authenticating,
    /// Walking the campaign listing
    Paginating,
    /// Syncing and persisting records
    Dispatching,
    /// Aggregating outcomes
    Summarizing,
    /// Run finished with a summary
    Done,
    /// Run aborted by a fatal error or cancellation
    Failed,
}

impl SyncPhase {
    /// Whether moving from `self` to `next` is a legal edge
    pub fn can_transition_to(self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        matches!(
            (self, next),
            (Idle, Authenticating)
                | (Authenticating, Paginating)
                | (Authenticating, Failed)
                | (Paginating, Dispatching)
                | (Paginating, Failed)
                // Only reachable through a worker panic
                | (Dispatching, Failed)
                | (Dispatching, Summarizing)
                | (Summarizing, Done)
                | (Done, Idle)
                | (Failed, Idle)
        )
    }

    /// Whether the run has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncPhase::Done | SyncPhase::Failed)
    }

    /// Lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Authenticating => "authenticating",
            SyncPhase::Paginating => "paginating",
            SyncPhase::Dispatching => "dispatching",
            SyncPhase::Summarizing => "summarizing",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinates authentication, pagination, dispatch, and summary
pub struct SyncOrchestrator {
    tokens: Arc<TokenProvider>,
    source: Arc<dyn CampaignSource>,
    repository: Arc<dyn CampaignRepository>,
    pagination: PaginationDriver,
    concurrency: usize,
    allow_partial: bool,
    cancel: CancellationToken,
    phase: watch::Sender<SyncPhase>,
    metrics: Option<Arc<SyncMetrics>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator from its collaborators
    pub fn new(
        tokens: Arc<TokenProvider>,
        source: Arc<dyn CampaignSource>,
        repository: Arc<dyn CampaignRepository>,
        config: &Config,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            tokens,
            pagination: PaginationDriver::new(Arc::clone(&source), &config.pagination),
            source,
            repository,
            concurrency: config.sync.concurrency.max(1),
            allow_partial: config.sync.allow_partial,
            cancel: CancellationToken::new(),
            phase,
            metrics: None,
        }
    }

    /// Override the partial-pagination policy
    pub fn with_allow_partial(mut self, allow_partial: bool) -> Self {
        self.allow_partial = allow_partial;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach metrics instruments
    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Current phase
    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Watch phase changes
    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Token that cancels the run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute one full sync run
    pub async fn run(&self) -> Result<SyncSummary, SyncRunError> {
        let started = Instant::now();
        if self.phase().is_terminal() {
            self.transition(SyncPhase::Idle);
        }

        self.transition(SyncPhase::Authenticating);
        let authenticated = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncRunError::Cancelled),
            result = self.tokens.get_token() => result.map_err(SyncRunError::from),
        };
        if let Err(err) = authenticated {
            return Err(self.fail(err));
        }

        self.transition(SyncPhase::Paginating);
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(self.fail(SyncRunError::Cancelled)),
            result = self.pagination.fetch_all() => result,
        };
        let (records, pagination_incomplete) = match fetched {
            Ok(records) => (records, false),
            Err(PaginationError::Incomplete {
                page,
                records,
                source,
            }) if self.allow_partial => {
                warn!(
                    page,
                    records = records.len(),
                    error = %source,
                    "Continuing with partial record set"
                );
                (records, true)
            }
            Err(err) => return Err(self.fail(err.into())),
        };

        self.transition(SyncPhase::Dispatching);
        let dispatcher =
            ConcurrencyDispatcher::with_cancellation(self.concurrency, self.cancel.clone());
        let source = Arc::clone(&self.source);
        let repository = Arc::clone(&self.repository);
        let dispatched = dispatcher
            .run(records, move |campaign| {
                let source = Arc::clone(&source);
                let repository = Arc::clone(&repository);
                async move { sync_record(source.as_ref(), repository.as_ref(), campaign).await }
            })
            .await;
        let mut summary = match dispatched {
            Ok(summary) => summary,
            Err(err) => return Err(self.fail(err.into())),
        };

        self.transition(SyncPhase::Summarizing);
        summary.pagination_incomplete = pagination_incomplete;
        summary.elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_summary(&summary);
        }
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            pagination_incomplete,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Sync run finished"
        );

        self.transition(SyncPhase::Done);
        Ok(summary)
    }

    fn transition(&self, next: SyncPhase) {
        self.phase.send_if_modified(|current| {
            if current.can_transition_to(next) {
                info!(from = %current, to = %next, "Sync phase changed");
                *current = next;
                true
            } else {
                warn!(from = %current, to = %next, "Ignoring illegal phase transition");
                false
            }
        });
    }

    fn fail(&self, err: SyncRunError) -> SyncRunError {
        error!(phase = %self.phase(), error = %err, "Sync run failed");
        if let Some(metrics) = &self.metrics {
            metrics.record_run("failed");
        }
        self.transition(SyncPhase::Failed);
        err
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("phase", &self.phase())
            .field("concurrency", &self.concurrency)
            .field("allow_partial", &self.allow_partial)
            .finish_non_exhaustive()
    }
}

/// Push one campaign to the remote and persist it locally
async fn sync_record(
    source: &dyn CampaignSource,
    repository: &dyn CampaignRepository,
    campaign: Campaign,
) -> Result<(), RecordFailure> {
    let ack = source.sync_campaign(&campaign.id).await?;
    if !ack.success {
        return Err(RecordFailure::new(
            FailureKind::Rejected,
            ack.message.unwrap_or_else(|| "Remote rejected the sync".to_string()),
        ));
    }

    repository.upsert(&campaign).await?;
    Ok(())
}
