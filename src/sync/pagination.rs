//! Sequential pagination over the campaign listing
//!
//! The driver walks pages from 1 while the server reports `has_more`,
//! bounded by a hard page ceiling. A page that fails after the transport's
//! retries ends the walk with the records fetched so far attached to the
//! error, so the caller decides whether a partial set is acceptable.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PaginationConfig;
use crate::error::{ApiError, PaginationError};
use crate::models::{Campaign, CampaignPage};
use crate::sync::api::CampaignSource;

/// Drives the listing endpoint to completion
pub struct PaginationDriver {
    source: Arc<dyn CampaignSource>,
    page_size: u32,
    max_pages: u32,
}

impl PaginationDriver {
    /// Create a driver over a campaign source
    pub fn new(source: Arc<dyn CampaignSource>, config: &PaginationConfig) -> Self {
        Self {
            source,
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
        }
    }

    /// Fetch every record, starting fresh at page 1
    ///
    /// Pages are requested strictly one after another. An empty page with
    /// `has_more` set does not end the walk; reaching `max_pages` does, with a
    /// warning.
    pub async fn fetch_all(&self) -> Result<Vec<Campaign>, PaginationError> {
        let mut records: Vec<Campaign> = Vec::new();
        let mut page = 1u32;

        loop {
            if page > self.max_pages {
                warn!(
                    max_pages = self.max_pages,
                    records = records.len(),
                    "Page ceiling reached while server still reports more data"
                );
                return Ok(records);
            }

            let result = match self.source.fetch_page(page, self.page_size).await {
                Ok(result) => result,
                Err(ApiError::Auth(err)) => return Err(PaginationError::Auth(err)),
                Err(ApiError::Transport(source)) => {
                    warn!(
                        page,
                        records = records.len(),
                        error = %source,
                        "Page fetch failed, pagination incomplete"
                    );
                    return Err(PaginationError::Incomplete {
                        page,
                        records,
                        source,
                    });
                }
            };

            let has_more = result.pagination.has_more;
            debug!(
                page,
                fetched = result.data.len(),
                total = result.pagination.total,
                has_more,
                "Fetched page"
            );
            records.extend(result.data);

            if !has_more {
                info!(pages = page, records = records.len(), "Pagination complete");
                return Ok(records);
            }
            page += 1;
        }
    }

    /// Fetch a single page
    pub async fn fetch_page(&self, page: u32) -> Result<CampaignPage, ApiError> {
        self.source.fetch_page(page, self.page_size).await
    }

    /// Configured page size
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Configured page ceiling
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }
}
