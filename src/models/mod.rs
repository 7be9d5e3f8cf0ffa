//! Domain models for campaign-sync
//!
//! This module contains the core domain models used throughout the application.

pub mod campaign;
pub mod sync;
pub mod token;

// Re-export commonly used types
pub use campaign::{
    parse_timestamp, Campaign, CampaignPage, CampaignStatus, Pagination, StoredCampaign,
};
pub use sync::{FailedRecord, FailureKind, RecordFailure, SyncAck, SyncOutcome, SyncSummary};
pub use token::{Credential, TokenResponse};
