//! End-to-end sync integration tests
//!
//! Runs the orchestrator against a mock campaign API and a real SQLite
//! repository:
//! - Every record is synced and persisted
//! - Re-running is idempotent
//! - Per-record failures are isolated and reported

mod common;

use campaign_sync::database::{CampaignRepository, SqliteRepository};
use campaign_sync::config::DatabaseConfig;
use campaign_sync::models::{CampaignStatus, FailureKind};
use campaign_sync::sync::SyncPhase;
use common::{
    create_orchestrator, create_test_repository, mount_auth, mount_list, mount_sync,
    test_config, CampaignListResponder, SyncResponder,
};
use std::sync::Arc;
use wiremock::{MockServer, ResponseTemplate};

/// Test 1: A full run persists every record, and a rerun keeps the same rows
#[tokio::test]
async fn test_end_to_end_sync_is_idempotent() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_list(&server, CampaignListResponder::new(100)).await;
    mount_sync(&server, SyncResponder::accept_all()).await;

    let dir = tempfile::tempdir().unwrap();
    let repository = Arc::new(
        SqliteRepository::open(&DatabaseConfig {
            path: dir.path().join("campaigns.db").to_string_lossy().into_owned(),
            pool_size: 4,
            busy_timeout_ms: 5000,
        })
        .unwrap(),
    );

    let config = test_config(&server.uri());
    let (_tokens, orchestrator) = create_orchestrator(&config, repository.clone());

    let first = orchestrator.run().await.unwrap();
    assert_eq!(first.total, 100);
    assert_eq!(first.succeeded, 100);
    assert!(first.is_healthy());
    assert_eq!(orchestrator.phase(), SyncPhase::Done);
    assert_eq!(repository.count().await.unwrap(), 100);

    let before = repository.get("cmp-042").await.unwrap().unwrap();

    let second = orchestrator.run().await.unwrap();
    assert_eq!(second.succeeded, 100);
    assert_eq!(repository.count().await.unwrap(), 100);

    let after = repository.get("cmp-042").await.unwrap().unwrap();
    assert_eq!(after.campaign, before.campaign);
    assert_eq!(after.campaign.status, CampaignStatus::Active);
    assert_eq!(after.campaign.impressions, 42_000);
    assert!(after.synced_at >= before.synced_at);
}

/// Test 2: One failing record leaves the rest synced
#[tokio::test]
async fn test_partial_failure_isolation() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_list(&server, CampaignListResponder::new(5)).await;
    mount_sync(&server, SyncResponder::failing(&["cmp-003"], 422)).await;

    let repository = create_test_repository();
    let config = test_config(&server.uri());
    let (_tokens, orchestrator) = create_orchestrator(&config, repository.clone());

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].record_id, "cmp-003");
    assert_eq!(summary.failures[0].kind, FailureKind::ClientError);
    assert!(!summary.is_healthy());

    assert_eq!(repository.count().await.unwrap(), 4);
    assert!(repository.get("cmp-003").await.unwrap().is_none());
}

/// Test 3: Partial pagination is accepted when the policy allows it
#[tokio::test]
async fn test_allow_partial_pagination() {
    let server = MockServer::start().await;
    mount_auth(&server).await;

    let mut responder = CampaignListResponder::new(40);
    for request in 2..=5 {
        responder = responder.with_fault(request, ResponseTemplate::new(500));
    }
    mount_list(&server, responder).await;
    mount_sync(&server, SyncResponder::accept_all()).await;

    let repository = create_test_repository();
    let mut config = test_config(&server.uri());
    config.sync.allow_partial = true;
    let (_tokens, orchestrator) = create_orchestrator(&config, repository.clone());

    let summary = orchestrator.run().await.unwrap();

    assert!(summary.pagination_incomplete);
    assert_eq!(summary.succeeded, 10);
    assert!(!summary.is_healthy());
    assert!(summary.to_string().contains("pagination incomplete"));
    assert_eq!(repository.count().await.unwrap(), 10);
}
