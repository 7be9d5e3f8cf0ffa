//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use campaign_sync::auth::TokenProvider;
use campaign_sync::config::{
    ApiConfig, Config, PaginationConfig, RateLimitConfig, RetryConfig, SyncConfig,
};
use campaign_sync::database::{CampaignRepository, SqliteRepository};
use campaign_sync::sync::{CampaignApiClient, ResilientTransport, SyncOrchestrator};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const TEST_EMAIL: &str = "ops@example.com";
pub const TEST_PASSWORD: &str = "secret";

/// Campaign JSON as served by the remote API
pub fn campaign_json(index: usize) -> serde_json::Value {
    json!({
        "id": format!("cmp-{:03}", index),
        "name": format!("Campaign {}", index),
        "status": if index % 2 == 0 { "active" } else { "paused" },
        "budget": 100.0 + index as f64,
        "impressions": index * 1000,
        "clicks": index * 10,
        "conversions": index,
        "created_at": "2024-01-15T10:30:00Z"
    })
}

/// Serves `total` campaigns by `page`/`limit` query parameters
///
/// Requests are numbered from 1; a request whose number has an injected
/// fault gets that response instead of a page.
pub struct CampaignListResponder {
    total: usize,
    faults: HashMap<usize, ResponseTemplate>,
    requests: Arc<AtomicUsize>,
}

impl CampaignListResponder {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            faults: HashMap::new(),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace request number `request` with `response`
    pub fn with_fault(mut self, request: usize, response: ResponseTemplate) -> Self {
        self.faults.insert(request, response);
        self
    }

    /// Shared request counter
    pub fn request_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.requests)
    }
}

impl Respond for CampaignListResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let number = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(fault) = self.faults.get(&number) {
            return fault.clone();
        }

        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        let limit: usize = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(10);

        let start = (page - 1) * limit;
        let end = (start + limit).min(self.total);
        let data: Vec<_> = (start..end).map(|i| campaign_json(i + 1)).collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "data": data,
            "pagination": {
                "page": page,
                "limit": limit,
                "total": self.total,
                "has_more": end < self.total
            }
        }))
    }
}

/// Acknowledges every sync except the listed campaign ids, which get `status`
pub struct SyncResponder {
    failing: HashSet<String>,
    status: u16,
}

impl SyncResponder {
    pub fn accept_all() -> Self {
        Self {
            failing: HashSet::new(),
            status: 400,
        }
    }

    pub fn failing(ids: &[&str], status: u16) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            status,
        }
    }
}

impl Respond for SyncResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let campaign_id = request
            .url
            .path_segments()
            .and_then(|segments| segments.rev().nth(1))
            .unwrap_or_default()
            .to_string();

        if self.failing.contains(&campaign_id) {
            return ResponseTemplate::new(self.status);
        }

        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "campaign_id": campaign_id,
            "synced_at": "2024-06-01T00:00:00Z"
        }))
    }
}

/// Mount a credential exchange that always succeeds
pub async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "integration-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "issued_at": "2024-01-01T00:00:00Z"
        })))
        .mount(server)
        .await;
}

/// Mount the listing endpoint
pub async fn mount_list(server: &MockServer, responder: CampaignListResponder) {
    Mock::given(method("GET"))
        .and(path("/api/campaigns"))
        .respond_with(responder)
        .mount(server)
        .await;
}

/// Mount the per-campaign sync endpoint
pub async fn mount_sync(server: &MockServer, responder: SyncResponder) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/api/campaigns/[^/]+/sync$"))
        .respond_with(responder)
        .mount(server)
        .await;
}

/// Configuration pointing at the mock server with fast retries
pub fn test_config(base_url: &str) -> Config {
    Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            email: TEST_EMAIL.to_string(),
            password: TEST_PASSWORD.to_string(),
        },
        retry: RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            jitter: false,
            ..RetryConfig::default()
        },
        rate_limit: RateLimitConfig {
            safety_margin_ms: 0,
            ..RateLimitConfig::default()
        },
        pagination: PaginationConfig {
            page_size: 10,
            max_pages: 1000,
        },
        sync: SyncConfig {
            concurrency: 4,
            allow_partial: false,
        },
        ..Default::default()
    }
}

/// Authenticated API client and its token provider
pub fn create_api_client(config: &Config) -> (Arc<TokenProvider>, Arc<CampaignApiClient>) {
    let client = reqwest::Client::new();
    let tokens = Arc::new(TokenProvider::new(
        ResilientTransport::from_config(client.clone(), config),
        config,
    ));
    let transport =
        ResilientTransport::from_config(client, config).with_token_provider(Arc::clone(&tokens));
    let api = CampaignApiClient::new(transport, config).expect("Failed to create API client");
    (tokens, Arc::new(api))
}

/// Wire a full orchestrator against the mock server
pub fn create_orchestrator(
    config: &Config,
    repository: Arc<dyn CampaignRepository>,
) -> (Arc<TokenProvider>, SyncOrchestrator) {
    let (tokens, api) = create_api_client(config);
    let orchestrator = SyncOrchestrator::new(Arc::clone(&tokens), api, repository, config);
    (tokens, orchestrator)
}

/// Create an in-memory repository for testing
pub fn create_test_repository() -> Arc<SqliteRepository> {
    Arc::new(SqliteRepository::in_memory().expect("Failed to create test repository"))
}
