//! Remote campaign API client
//!
//! [`CampaignSource`] is the seam between the sync engine and the remote
//! endpoints. [`CampaignApiClient`] implements it over the resilient
//! transport; tests substitute the generated mock.

use async_trait::async_trait;
use reqwest::Url;

use crate::config::{Config, ConfigError, TimeoutConfig};
use crate::error::ApiError;
use crate::models::{CampaignPage, SyncAck};
use crate::sync::transport::{RequestSpec, ResilientTransport};

/// Remote source of campaign records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignSource: Send + Sync {
    /// Fetch one page of the listing (1-based)
    async fn fetch_page(&self, page: u32, limit: u32) -> Result<CampaignPage, ApiError>;

    /// Trigger the remote sync of one campaign
    async fn sync_campaign(&self, campaign_id: &str) -> Result<SyncAck, ApiError>;
}

/// HTTP implementation of [`CampaignSource`]
#[derive(Debug, Clone)]
pub struct CampaignApiClient {
    transport: ResilientTransport,
    base_url: Url,
    timeouts: TimeoutConfig,
}

impl CampaignApiClient {
    /// Create a client for the configured base URL
    ///
    /// `transport` should carry a token provider; both endpoints require
    /// bearer auth.
    pub fn new(transport: ResilientTransport, config: &Config) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.api.base_url).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "api.base_url '{}' is not a valid URL: {}",
                config.api.base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue(format!(
                "api.base_url '{}' cannot be used as a base URL",
                config.api.base_url
            )));
        }

        Ok(Self {
            transport,
            base_url,
            timeouts: config.timeouts.clone(),
        })
    }

    /// URL of the listing endpoint for one page
    pub fn page_url(&self, page: u32, limit: u32) -> Url {
        let mut url = self.endpoint_url(&["api", "campaigns"]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &limit.to_string());
        url
    }

    /// URL of the per-campaign sync endpoint
    pub fn sync_url(&self, campaign_id: &str) -> Url {
        self.endpoint_url(&["api", "campaigns", campaign_id, "sync"])
    }

    fn endpoint_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl CampaignSource for CampaignApiClient {
    async fn fetch_page(&self, page: u32, limit: u32) -> Result<CampaignPage, ApiError> {
        let spec = RequestSpec::get(self.page_url(page, limit).as_str())
            .with_timeout(self.timeouts.list())
            .with_endpoint("list_campaigns");

        let response = self.transport.execute(&spec).await?;
        Ok(response.json()?)
    }

    async fn sync_campaign(&self, campaign_id: &str) -> Result<SyncAck, ApiError> {
        let spec = RequestSpec::post(self.sync_url(campaign_id).as_str())
            .with_timeout(self.timeouts.sync())
            .with_endpoint("sync_campaign");

        let response = self.transport.execute(&spec).await?;
        Ok(response.json()?)
    }
}
