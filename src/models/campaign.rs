//! Campaign domain models
//!
//! This module defines the remote campaign record, its status, and the
//! paginated listing envelope.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle status of a campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    /// Running
    Active,
    /// Temporarily stopped
    Paused,
    /// Finished
    Completed,
    /// Not yet launched
    Draft,
    /// Any status string this client does not know
    #[default]
    #[serde(other)]
    Unknown,
}

impl CampaignStatus {
    /// Lowercase wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Draft => "draft",
            CampaignStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "draft" => Ok(CampaignStatus::Draft),
            "unknown" => Ok(CampaignStatus::Unknown),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// A campaign record as served by the listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Stable unique identifier, the persistence key
    pub id: String,

    /// Display name
    pub name: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: CampaignStatus,

    /// Budget in account currency
    #[serde(default)]
    pub budget: f64,

    /// Impression count
    #[serde(default)]
    pub impressions: u64,

    /// Click count
    #[serde(default)]
    pub clicks: u64,

    /// Conversion count
    #[serde(default)]
    pub conversions: u64,

    /// Creation time on the remote side
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a campaign with zeroed counters
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: CampaignStatus::Active,
            budget: 0.0,
            impressions: 0,
            clicks: 0,
            conversions: 0,
            created_at: Utc::now(),
        }
    }

    /// Set status
    pub fn with_status(mut self, status: CampaignStatus) -> Self {
        self.status = status;
        self
    }

    /// Set budget
    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }

    /// Set the three counters
    pub fn with_counters(mut self, impressions: u64, clicks: u64, conversions: u64) -> Self {
        self.impressions = impressions;
        self.clicks = clicks;
        self.conversions = conversions;
        self
    }

    /// Set creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 timestamp taken as UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("Invalid timestamp: {}", value))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Pagination metadata of a listing response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number
    pub page: u32,

    /// Requested page size
    pub limit: u32,

    /// Total number of records on the remote side
    pub total: u64,

    /// Whether another page follows; authoritative for termination
    pub has_more: bool,
}

/// One page of the campaign listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPage {
    /// Records on this page (may be empty)
    #[serde(default)]
    pub data: Vec<Campaign>,

    /// Pagination metadata
    pub pagination: Pagination,
}

/// A campaign as read back from the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCampaign {
    /// Record fields
    #[serde(flatten)]
    pub campaign: Campaign,

    /// Time of the most recent successful write
    pub synced_at: DateTime<Utc>,
}
