//! Application error types for campaign-sync
//!
//! This module defines the error taxonomy shared by the synchronization engine.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::models::Campaign;

/// Authentication-related errors
///
/// Every variant is fatal for a sync run: without a valid token no
/// useful partial progress is possible.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// The auth endpoint rejected the configured credentials
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// A freshly issued token was rejected by the API
    #[error("Token rejected after refresh")]
    Rejected,

    /// The auth endpoint could not be reached within the retry budget
    #[error("Auth endpoint unavailable: {0}")]
    Unavailable(TransportError),

    /// The token response could not be decoded
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Transport-level errors surfaced after retries are exhausted
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// Per-call deadline expired
    #[error("Request timed out")]
    Timeout,

    /// Non-retryable 4xx response
    #[error("Client error: HTTP {0}")]
    ClientError(u16),

    /// 5xx response
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// 429 ceiling reached
    #[error("Rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted {
        /// Number of 429 responses observed
        attempts: u32,
    },

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Error returned by calls through the resilient transport
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// Fatal authentication failure
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Transport failure after retries
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Persistence errors
///
/// Treated as per-record failures by the dispatcher, never fatal to a batch.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error (exhaustion, checkout timeout)
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Record cannot be represented in the schema
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Blocking task failed to complete
    #[error("Database task failed: {0}")]
    Task(String),
}

/// Pagination failures
#[derive(Debug, Error)]
pub enum PaginationError {
    /// Authentication failed while listing
    #[error("Authentication failed during pagination: {0}")]
    Auth(#[from] AuthError),

    /// A page could not be fetched; carries the records accumulated so far
    #[error("Pagination incomplete at page {page} ({} records fetched): {source}", .records.len())]
    Incomplete {
        /// Page that failed
        page: u32,
        /// Records fetched before the failure
        records: Vec<Campaign>,
        /// Underlying transport failure
        source: TransportError,
    },
}

impl PaginationError {
    /// Number of records fetched before the failure
    pub fn fetched_count(&self) -> usize {
        match self {
            PaginationError::Auth(_) => 0,
            PaginationError::Incomplete { records, .. } => records.len(),
        }
    }
}

/// Dispatcher-level defects that abort a whole run
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    /// A worker panicked
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Fatal orchestrator errors
#[derive(Debug, Error)]
pub enum SyncRunError {
    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Pagination did not complete and partial sets are not allowed
    #[error("Pagination failed: {0}")]
    Pagination(#[from] PaginationError),

    /// Dispatcher defect
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// Run cancelled before dispatching
    #[error("Sync run cancelled")]
    Cancelled,
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Network(_) => true,
            TransportError::ServerError(code) => matches!(code, 500 | 502 | 503 | 504),

            TransportError::ClientError(_) => false,
            TransportError::RateLimitExhausted { .. } => false,
            TransportError::InvalidResponse(_) => false,
        }
    }
}

impl RetryableError for ApiError {
    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Auth(_) => false,
            ApiError::Transport(err) => err.is_retryable(),
        }
    }
}
