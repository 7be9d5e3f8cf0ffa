//! Persistence layer for campaign-sync
//!
//! This module defines the repository trait and its SQLite implementation.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteRepository;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::models::{Campaign, StoredCampaign};

/// Repository trait for campaign persistence
///
/// Writes are idempotent upserts keyed by the campaign identifier, so a
/// record can be written any number of times with the same net effect.
/// It uses `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Insert the campaign, or overwrite every field except `id` and `created_at`
    async fn upsert(&self, campaign: &Campaign) -> Result<(), PersistenceError>;

    /// Get a stored campaign by identifier
    async fn get(&self, id: &str) -> Result<Option<StoredCampaign>, PersistenceError>;

    /// Number of stored campaigns
    async fn count(&self) -> Result<u64, PersistenceError>;
}
