//! Sync result models
//!
//! Per-record outcomes, their failure classification, and the run summary.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ApiError, AuthError, PersistenceError, TransportError};

/// Body returned by `POST /api/campaigns/{id}/sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAck {
    /// Whether the remote side accepted the sync
    pub success: bool,

    /// Campaign the acknowledgement is for
    pub campaign_id: String,

    /// Remote sync timestamp (informational)
    #[serde(default)]
    pub synced_at: Option<String>,

    /// Optional message
    #[serde(default)]
    pub message: Option<String>,
}

/// Classification of a per-record failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Authentication failed for this record
    Auth,
    /// Deadline expired after retries
    Timeout,
    /// 429 ceiling reached
    RateLimited,
    /// Non-retryable 4xx
    ClientError,
    /// 5xx after retries
    ServerError,
    /// Connection-level failure after retries
    Network,
    /// Response could not be decoded
    InvalidResponse,
    /// Remote side answered `success: false`
    Rejected,
    /// Repository write failed
    Persistence,
    /// Run was cancelled while the record was in flight
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Auth => "auth",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ClientError => "client_error",
            FailureKind::ServerError => "server_error",
            FailureKind::Network => "network",
            FailureKind::InvalidResponse => "invalid_response",
            FailureKind::Rejected => "rejected",
            FailureKind::Persistence => "persistence",
            FailureKind::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Why a record failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Failure classification
    pub kind: FailureKind,

    /// Human-readable detail
    pub message: String,
}

impl RecordFailure {
    /// Create a new record failure
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure for a record whose work was cancelled
    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "sync run cancelled")
    }
}

impl From<&TransportError> for FailureKind {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout => FailureKind::Timeout,
            TransportError::ClientError(_) => FailureKind::ClientError,
            TransportError::ServerError(_) => FailureKind::ServerError,
            TransportError::Network(_) => FailureKind::Network,
            TransportError::RateLimitExhausted { .. } => FailureKind::RateLimited,
            TransportError::InvalidResponse(_) => FailureKind::InvalidResponse,
        }
    }
}

impl From<ApiError> for RecordFailure {
    fn from(err: ApiError) -> Self {
        let kind = match &err {
            ApiError::Auth(AuthError::Unavailable(inner)) => FailureKind::from(inner),
            ApiError::Auth(_) => FailureKind::Auth,
            ApiError::Transport(inner) => FailureKind::from(inner),
        };
        Self::new(kind, err.to_string())
    }
}

impl From<PersistenceError> for RecordFailure {
    fn from(err: PersistenceError) -> Self {
        Self::new(FailureKind::Persistence, err.to_string())
    }
}

/// Outcome of one record's sync operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Record identifier
    pub record_id: String,

    /// Whether the record was synced and persisted
    pub success: bool,

    /// Failure detail when `success` is false
    pub failure: Option<RecordFailure>,
}

impl SyncOutcome {
    /// Successful outcome
    pub fn succeeded(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            success: true,
            failure: None,
        }
    }

    /// Failed outcome
    pub fn failed(record_id: impl Into<String>, failure: RecordFailure) -> Self {
        Self {
            record_id: record_id.into(),
            success: false,
            failure: Some(failure),
        }
    }
}

/// A failed record in the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Record identifier
    pub record_id: String,

    /// Failure classification
    pub kind: FailureKind,

    /// Human-readable detail
    pub message: String,
}

/// Aggregate result of one sync run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Records attempted
    pub total: usize,

    /// Records synced and persisted
    pub succeeded: usize,

    /// Records that failed
    pub failed: usize,

    /// Records never started because the run was cancelled
    pub skipped: usize,

    /// Failure details
    pub failures: Vec<FailedRecord>,

    /// The record set was partial because pagination did not complete
    pub pagination_incomplete: bool,

    /// Wall-clock duration of the run
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl SyncSummary {
    /// Aggregate outcomes into a summary
    pub fn from_outcomes(outcomes: &[SyncOutcome], skipped: usize) -> Self {
        let mut summary = SyncSummary {
            total: outcomes.len(),
            skipped,
            ..Default::default()
        };

        for outcome in outcomes {
            if outcome.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
                let (kind, message) = match &outcome.failure {
                    Some(failure) => (failure.kind, failure.message.clone()),
                    None => (FailureKind::Rejected, String::new()),
                };
                summary.failures.push(FailedRecord {
                    record_id: outcome.record_id.clone(),
                    kind,
                    message,
                });
            }
        }

        summary
    }

    /// True when every fetched record succeeded and the record set was complete
    pub fn is_healthy(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && !self.pagination_incomplete
    }
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sync complete: {} total, {} succeeded, {} failed, {} skipped in {:.2}s",
            self.total,
            self.succeeded,
            self.failed,
            self.skipped,
            self.elapsed.as_secs_f64()
        )?;
        if self.pagination_incomplete {
            write!(f, " (pagination incomplete)")?;
        }
        for failure in &self.failures {
            write!(
                f,
                "\n  - {} [{}]: {}",
                failure.record_id, failure.kind, failure.message
            )?;
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
