//! SQLite implementation of the CampaignRepository trait
//!
//! This module provides a SQLite-backed repository using rusqlite over an
//! r2d2 connection pool. The pool is built once; each write checks out its
//! own connection on a blocking thread.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::migrations::{migration_version, CREATE_SCHEMA};
use super::CampaignRepository;
use crate::config::DatabaseConfig;
use crate::error::PersistenceError;
use crate::models::{parse_timestamp, Campaign, CampaignStatus, StoredCampaign};

type SqlitePool = Pool<SqliteConnectionManager>;

/// SQLite repository implementation
#[derive(Clone)]
pub struct SqliteRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteRepository {
    /// Open (or create) the database and build the connection pool
    ///
    /// Use `:memory:` for an in-memory database; it is served by a single
    /// pooled connection that is never recycled.
    pub fn open(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);

        let pool = if config.path == ":memory:" {
            let manager = SqliteConnectionManager::memory()
                .with_init(move |conn| configure_connection(conn, busy_timeout));
            Pool::builder()
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .build(manager)?
        } else {
            let manager = SqliteConnectionManager::file(&config.path)
                .with_init(move |conn| configure_connection(conn, busy_timeout));
            Pool::builder()
                .max_size(config.pool_size.max(1))
                .build(manager)?
        };

        let repository = Self {
            pool: Arc::new(pool),
        };
        repository.migrate()?;

        info!(
            path = %config.path,
            pool_size = repository.pool.max_size(),
            "Database pool ready"
        );
        Ok(repository)
    }

    /// Create a new in-memory repository (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        Self::open(&DatabaseConfig {
            path: ":memory:".to_string(),
            ..DatabaseConfig::default()
        })
    }

    /// Current pool state (open and idle connections)
    pub fn pool_state(&self) -> r2d2::State {
        self.pool.state()
    }

    fn migrate(&self) -> Result<(), PersistenceError> {
        let conn = self.pool.get()?;
        conn.execute_batch(CREATE_SCHEMA)
            .map_err(|e| PersistenceError::Migration(e.to_string()))?;

        let current: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| PersistenceError::Migration(e.to_string()))?;
        if current < migration_version() {
            conn.pragma_update(None, "user_version", migration_version())
                .map_err(|e| PersistenceError::Migration(e.to_string()))?;
            debug!(from = current, to = migration_version(), "Schema migrated");
        }
        Ok(())
    }

    /// Upsert with an explicit sync timestamp
    pub(crate) async fn upsert_synced_at(
        &self,
        campaign: &Campaign,
        synced_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let row = CampaignRow::try_from_campaign(campaign, synced_at)?;
        let pool = Arc::clone(&self.pool);

        tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            let conn = pool.get()?;
            conn.execute(
                r#"
                INSERT INTO campaigns
                (id, name, status, budget, impressions, clicks, conversions, created_at, synced_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    status = excluded.status,
                    budget = excluded.budget,
                    impressions = excluded.impressions,
                    clicks = excluded.clicks,
                    conversions = excluded.conversions,
                    synced_at = MAX(campaigns.synced_at, excluded.synced_at)
                "#,
                rusqlite::params![
                    row.id,
                    row.name,
                    row.status,
                    row.budget,
                    row.impressions,
                    row.clicks,
                    row.conversions,
                    row.created_at,
                    row.synced_at
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("SqliteRepository")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

fn configure_connection(
    conn: &mut rusqlite::Connection,
    busy_timeout: Duration,
) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(busy_timeout)?;
    // In-memory databases answer "memory"; the value is not checked
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    Ok(())
}

fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Column values of one campaign row
struct CampaignRow {
    id: String,
    name: String,
    status: String,
    budget: f64,
    impressions: i64,
    clicks: i64,
    conversions: i64,
    created_at: String,
    synced_at: String,
}

impl CampaignRow {
    fn try_from_campaign(
        campaign: &Campaign,
        synced_at: DateTime<Utc>,
    ) -> Result<Self, PersistenceError> {
        if campaign.id.is_empty() {
            return Err(PersistenceError::InvalidRecord(
                "campaign id is empty".to_string(),
            ));
        }
        if !campaign.budget.is_finite() {
            return Err(PersistenceError::InvalidRecord(format!(
                "campaign {}: budget is not a finite number",
                campaign.id
            )));
        }

        let counter = |name: &str, value: u64| {
            i64::try_from(value).map_err(|_| {
                PersistenceError::InvalidRecord(format!(
                    "campaign {}: {} {} exceeds storage range",
                    campaign.id, name, value
                ))
            })
        };

        Ok(Self {
            id: campaign.id.clone(),
            name: campaign.name.clone(),
            status: campaign.status.to_string(),
            budget: campaign.budget,
            impressions: counter("impressions", campaign.impressions)?,
            clicks: counter("clicks", campaign.clicks)?,
            conversions: counter("conversions", campaign.conversions)?,
            created_at: format_timestamp(&campaign.created_at),
            synced_at: format_timestamp(&synced_at),
        })
    }

    fn into_stored(self) -> Result<StoredCampaign, PersistenceError> {
        let invalid = |e: String| PersistenceError::InvalidRecord(format!("{}: {}", self.id, e));
        let counter = |value: i64| {
            u64::try_from(value).map_err(|_| invalid(format!("negative counter {}", value)))
        };

        let campaign = Campaign {
            status: self
                .status
                .parse()
                .unwrap_or(CampaignStatus::Unknown),
            budget: self.budget,
            impressions: counter(self.impressions)?,
            clicks: counter(self.clicks)?,
            conversions: counter(self.conversions)?,
            created_at: parse_timestamp(&self.created_at).map_err(invalid)?,
            id: self.id.clone(),
            name: self.name.clone(),
        };
        let synced_at = parse_timestamp(&self.synced_at).map_err(invalid)?;

        Ok(StoredCampaign {
            campaign,
            synced_at,
        })
    }
}

#[async_trait]
impl CampaignRepository for SqliteRepository {
    async fn upsert(&self, campaign: &Campaign) -> Result<(), PersistenceError> {
        self.upsert_synced_at(campaign, Utc::now()).await
    }

    async fn get(&self, id: &str) -> Result<Option<StoredCampaign>, PersistenceError> {
        let id = id.to_string();
        let pool = Arc::clone(&self.pool);

        let row = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let row = conn
                .query_row(
                    r#"
                    SELECT id, name, status, budget, impressions, clicks, conversions,
                           created_at, synced_at
                    FROM campaigns
                    WHERE id = ?1
                    "#,
                    [&id],
                    |row| {
                        Ok(CampaignRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            status: row.get(2)?,
                            budget: row.get(3)?,
                            impressions: row.get(4)?,
                            clicks: row.get(5)?,
                            conversions: row.get(6)?,
                            created_at: row.get(7)?,
                            synced_at: row.get(8)?,
                        })
                    },
                )
                .optional()?;
            Ok::<_, PersistenceError>(row)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))??;

        row.map(CampaignRow::into_stored).transpose()
    }

    async fn count(&self) -> Result<u64, PersistenceError> {
        let pool = Arc::clone(&self.pool);

        let count = tokio::task::spawn_blocking(move || -> Result<i64, PersistenceError> {
            let conn = pool.get()?;
            let count = conn.query_row("SELECT COUNT(*) FROM campaigns", [], |row| row.get(0))?;
            Ok(count)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))??;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}
