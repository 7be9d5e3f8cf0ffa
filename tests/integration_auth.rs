//! Authentication integration tests
//!
//! Tests the credential lifecycle across a full sync run:
//! - A single credential exchange serves every request of a run
//! - Invalid credentials abort the run
//! - An expired token is refreshed transparently after a 401

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use campaign_sync::auth::basic_auth_header;
use campaign_sync::error::{AuthError, SyncRunError};
use campaign_sync::sync::SyncPhase;
use common::{
    create_orchestrator, create_test_repository, mount_auth, mount_list, mount_sync,
    test_config, CampaignListResponder, SyncResponder, TEST_EMAIL, TEST_PASSWORD,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Test 1: One credential exchange for an entire run
#[tokio::test]
async fn test_token_reused_across_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(header(
            "Authorization",
            basic_auth_header(TEST_EMAIL, TEST_PASSWORD).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "integration-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_list(&server, CampaignListResponder::new(30)).await;
    mount_sync(&server, SyncResponder::accept_all()).await;

    let config = test_config(&server.uri());
    let (tokens, orchestrator) = create_orchestrator(&config, create_test_repository());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.succeeded, 30);
    assert_eq!(tokens.refresh_count(), 1);
}

/// Test 2: Rejected credentials fail the run with no listing calls
#[tokio::test]
async fn test_invalid_credentials_fail_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/campaigns"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let repository = create_test_repository();
    let (_tokens, orchestrator) = create_orchestrator(&config, repository.clone());

    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(
        err,
        SyncRunError::Auth(AuthError::InvalidCredentials)
    ));
    assert_eq!(orchestrator.phase(), SyncPhase::Failed);
}

/// Responds 401 to the first listing request, then serves one page
struct ExpiringTokenResponder {
    requests: Arc<AtomicUsize>,
}

impl Respond for ExpiringTokenResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.requests.fetch_add(1, Ordering::SeqCst) == 0 {
            return ResponseTemplate::new(401);
        }
        ResponseTemplate::new(200).set_body_json(json!({
            "data": [common::campaign_json(1), common::campaign_json(2)],
            "pagination": { "page": 1, "limit": 10, "total": 2, "has_more": false }
        }))
    }
}

/// Test 3: A 401 mid-run triggers one refresh and the run succeeds
#[tokio::test]
async fn test_unauthorized_triggers_refresh() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/campaigns"))
        .respond_with(ExpiringTokenResponder {
            requests: Arc::new(AtomicUsize::new(0)),
        })
        .mount(&server)
        .await;
    mount_sync(&server, SyncResponder::accept_all()).await;

    let config = test_config(&server.uri());
    let (tokens, orchestrator) = create_orchestrator(&config, create_test_repository());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert!(summary.is_healthy());
    assert_eq!(tokens.refresh_count(), 2);
}
