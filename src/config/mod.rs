//! Configuration management for campaign-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables. Core components receive the
//! relevant sections at construction and never read the environment themselves.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Remote API endpoint and credentials
    #[serde(default)]
    pub api: ApiConfig,

    /// Per-endpoint deadlines
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Failure retry policy (5xx, timeouts, network errors)
    #[serde(default)]
    pub retry: RetryConfig,

    /// Backpressure (429) handling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Credential lifecycle
    #[serde(default)]
    pub token: TokenConfig,

    /// Listing endpoint pagination
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Dispatch phase settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix CAMPAIGN_SYNC_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(base_url) = std::env::var("CAMPAIGN_SYNC_API_BASE_URL") {
            config.api.base_url = base_url;
        }
        if let Ok(email) = std::env::var("CAMPAIGN_SYNC_API_EMAIL") {
            config.api.email = email;
        }
        if let Ok(password) = std::env::var("CAMPAIGN_SYNC_API_PASSWORD") {
            config.api.password = password;
        }

        if let Ok(concurrency) = std::env::var("CAMPAIGN_SYNC_CONCURRENCY") {
            config.sync.concurrency = concurrency
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid concurrency".to_string()))?;
        }
        if let Ok(max_retries) = std::env::var("CAMPAIGN_SYNC_MAX_RETRIES") {
            config.retry.max_retries = max_retries
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid max retries".to_string()))?;
        }
        if let Ok(page_size) = std::env::var("CAMPAIGN_SYNC_PAGE_SIZE") {
            config.pagination.page_size = page_size
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid page size".to_string()))?;
        }

        if let Ok(path) = std::env::var("CAMPAIGN_SYNC_DATABASE_PATH") {
            config.database.path = path;
        }
        if let Ok(pool_size) = std::env::var("CAMPAIGN_SYNC_DATABASE_POOL_SIZE") {
            config.database.pool_size = pool_size
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid pool size".to_string()))?;
        }

        if let Ok(level) = std::env::var("CAMPAIGN_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(enabled) = std::env::var("CAMPAIGN_SYNC_OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("CAMPAIGN_SYNC_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        Ok(config)
    }

    /// Check that required values are present and numeric limits are sane
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("api.base_url".to_string()));
        }
        if self.api.email.trim().is_empty() {
            return Err(ConfigError::MissingRequired("api.email".to_string()));
        }
        if self.api.password.is_empty() {
            return Err(ConfigError::MissingRequired("api.password".to_string()));
        }
        if self.sync.concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.concurrency must be at least 1".to_string(),
            ));
        }
        if self.pagination.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "pagination.page_size must be at least 1".to_string(),
            ));
        }
        if self.pagination.max_pages == 0 {
            return Err(ConfigError::InvalidValue(
                "pagination.max_pages must be at least 1".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote API configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Base URL of the campaign API (no trailing slash required)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Account email used for the credential exchange
    #[serde(default)]
    pub email: String,

    /// Account password used for the credential exchange
    #[serde(default)]
    pub password: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            email: String::new(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Per-endpoint deadlines in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    /// Deadline for the credential exchange
    #[serde(default = "default_auth_timeout")]
    pub auth_ms: u64,

    /// Deadline for a listing page
    #[serde(default = "default_list_timeout")]
    pub list_ms: u64,

    /// Deadline for a per-record sync call
    #[serde(default = "default_sync_timeout")]
    pub sync_ms: u64,

    /// TCP connect timeout for the underlying client
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
}

impl TimeoutConfig {
    pub fn auth(&self) -> Duration {
        Duration::from_millis(self.auth_ms)
    }

    pub fn list(&self) -> Duration {
        Duration::from_millis(self.list_ms)
    }

    pub fn sync(&self) -> Duration {
        Duration::from_millis(self.sync_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            auth_ms: default_auth_timeout(),
            list_ms: default_list_timeout(),
            sync_ms: default_sync_timeout(),
            connect_ms: default_connect_timeout(),
        }
    }
}

fn default_auth_timeout() -> u64 {
    10_000
}

fn default_list_timeout() -> u64 {
    15_000
}

fn default_sync_timeout() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    5_000
}

/// Retry configuration for transient failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff duration in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add `random(0, base)` jitter to backoff
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// HTTP statuses treated as transient
    #[serde(default = "default_retry_on_status")]
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
            retry_on_status: default_retry_on_status(),
        }
    }
}

fn default_max_retries() -> u32 {
    4
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

fn default_retry_on_status() -> Vec<u16> {
    vec![500, 502, 503, 504]
}

/// Backpressure (HTTP 429) configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Ceiling on 429 retries for a single call, separate from `retry.max_retries`
    #[serde(default = "default_rate_limit_retries")]
    pub max_retries: u32,

    /// Wait time when the server sends no usable Retry-After (in seconds)
    #[serde(default = "default_rate_limit_wait")]
    pub default_wait_secs: u64,

    /// Upper bound on a single 429 wait; longer Retry-After hints are clamped (in seconds)
    #[serde(default = "default_rate_limit_max_wait")]
    pub max_wait_secs: u64,

    /// Added to every server-provided wait
    #[serde(default = "default_safety_margin")]
    pub safety_margin_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_retries: default_rate_limit_retries(),
            default_wait_secs: default_rate_limit_wait(),
            max_wait_secs: default_rate_limit_max_wait(),
            safety_margin_ms: default_safety_margin(),
        }
    }
}

fn default_rate_limit_retries() -> u32 {
    10
}

fn default_rate_limit_wait() -> u64 {
    60
}

fn default_rate_limit_max_wait() -> u64 {
    300
}

fn default_safety_margin() -> u64 {
    250
}

/// Token lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenConfig {
    /// Refresh this many seconds before the token actually expires
    #[serde(default = "default_refresh_buffer")]
    pub refresh_buffer_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_buffer_secs: default_refresh_buffer(),
        }
    }
}

fn default_refresh_buffer() -> u64 {
    60
}

/// Pagination configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginationConfig {
    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Hard ceiling on pages fetched in one run
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_page_size() -> u32 {
    10
}

fn default_max_pages() -> u32 {
    100
}

/// Dispatch phase configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Maximum per-record operations in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Proceed with a partial record set when pagination fails mid-way
    #[serde(default)]
    pub allow_partial: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            allow_partial: false,
        }
    }
}

fn default_concurrency() -> usize {
    3
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file (`:memory:` for an in-memory store)
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

fn default_database_path() -> String {
    "campaigns.db".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "campaign-sync".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
