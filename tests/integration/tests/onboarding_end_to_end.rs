use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use httpmock::Mock;
use intake_pipeline::{
    content_hash, load_existing_index, write_report_atomic, BatchOutcome, ItemStatus,
    OnboardingPipeline, OnboardingReport, PipelineConfig, RollbackOutcome, RollbackStage,
};
use intake_registry::{HttpRegistryClient, RegistryClientConfig};
use serde_json::json;

const ADMIN_PREFIX: &str = "/api/admin";

fn registry_client(server: &MockServer) -> Arc<HttpRegistryClient> {
    Arc::new(
        HttpRegistryClient::new(RegistryClientConfig {
            base_url: format!("{}{ADMIN_PREFIX}", server.base_url()),
            admin_token: Some("admin-token".to_string()),
            request_timeout_ms: 5_000,
        })
        .expect("registry client should be created"),
    )
}

fn immediate_pipeline(client: &Arc<HttpRegistryClient>) -> OnboardingPipeline {
    OnboardingPipeline::new(
        client.clone(),
        PipelineConfig {
            settle_interval: Duration::ZERO,
            skip_flagged: false,
        },
    )
}

fn mock_listing<'a>(server: &'a MockServer, hashes: &[(u64, &str, &str)]) -> Mock<'a> {
    let credentials = hashes
        .iter()
        .map(|(id, token, email)| {
            json!({
                "id": id,
                "priority": 0,
                "disabled": false,
                "refreshTokenHash": content_hash(token),
                "email": email,
            })
        })
        .collect::<Vec<_>>();
    let body = json!({
        "total": credentials.len(),
        "available": credentials.len(),
        "credentials": credentials,
    });
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("{ADMIN_PREFIX}/credentials"))
            .header("authorization", "Bearer admin-token");
        then.status(200).json_body(body.clone());
    })
}

fn mock_create<'a>(server: &'a MockServer, token: &str, remote_id: u64) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(POST)
            .path(format!("{ADMIN_PREFIX}/credentials"))
            .body_includes(format!("\"refreshToken\":\"{token}\""));
        then.status(200).json_body(json!({
            "success": true,
            "message": "credential added",
            "credentialId": remote_id,
            "email": format!("user{remote_id}@example.com"),
        }));
    })
}

fn mock_balance_ok(server: &MockServer, remote_id: u64) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("{ADMIN_PREFIX}/credentials/{remote_id}/balance"));
        then.status(200).json_body(json!({
            "id": remote_id,
            "subscriptionTitle": "PRO",
            "currentUsage": 1.5,
            "usageLimit": 500.0,
            "remaining": 498.5,
            "usagePercentage": 0.3
        }));
    })
}

fn mock_balance_error(server: &MockServer, remote_id: u64) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("{ADMIN_PREFIX}/credentials/{remote_id}/balance"));
        then.status(502).json_body(json!({
            "error": {"type": "upstream_error", "message": "usage endpoint unavailable"}
        }));
    })
}

fn mock_disable(server: &MockServer, remote_id: u64, status: u16) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path(format!("{ADMIN_PREFIX}/credentials/{remote_id}/disabled"))
            .body_includes("\"disabled\":true");
        then.status(status)
            .json_body(json!({"success": status == 200, "message": "disable"}));
    })
}

fn mock_delete(server: &MockServer, remote_id: u64) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(DELETE)
            .path(format!("{ADMIN_PREFIX}/credentials/{remote_id}"));
        then.status(200)
            .json_body(json!({"success": true, "message": "deleted"}));
    })
}

#[tokio::test]
async fn integration_envelope_batch_onboards_dedups_and_rolls_back() {
    let server = MockServer::start();
    let listing = mock_listing(&server, &[(1, "rt-existing", "existing@example.com")]);
    let create_good = mock_create(&server, "rt-good", 11);
    let create_broken = mock_create(&server, "rt-broken", 12);
    let create_existing = mock_create(&server, "rt-existing", 99);
    let balance_good = mock_balance_ok(&server, 11);
    let balance_broken = mock_balance_error(&server, 12);
    let disable_good = mock_disable(&server, 11, 200);
    let disable_broken = mock_disable(&server, 12, 200);
    let delete_broken = mock_delete(&server, 12);

    let client = registry_client(&server);
    let mut index = load_existing_index(&*client)
        .await
        .expect("index should seed from listing");
    let pipeline = immediate_pipeline(&client);
    let raw = r#"{
        "version": "1.0",
        "exportedAt": 1735689600000,
        "accounts": [
            {"email": "existing@example.com", "status": "active", "credentials": {"refreshToken": "rt-existing"}},
            {"email": "good@example.com", "status": "active", "credentials": {"refreshToken": "rt-good"}},
            {"status": "active", "credentials": {"refreshToken": "rt-broken", "clientId": "cid", "clientSecret": "sec"}},
            {"status": "active", "credentials": {}}
        ]
    }"#;

    let (parsed, run) = pipeline
        .run_text(raw, &mut index)
        .await
        .expect("envelope should parse");

    assert_eq!(parsed.found, 4);
    assert_eq!(parsed.dropped, 1);
    assert_eq!(run.items.len(), 3);

    let existing = &run.items[0];
    assert_eq!(existing.status, ItemStatus::Duplicate);
    assert_eq!(existing.duplicate_of, Some(1));
    assert_eq!(existing.identity.as_deref(), Some("existing@example.com"));
    assert_eq!(existing.rollback, Some(RollbackOutcome::Skipped));

    let good = &run.items[1];
    assert_eq!(good.status, ItemStatus::Verified);
    assert_eq!(good.remote_id, Some(11));
    assert_eq!(good.identity.as_deref(), Some("user11@example.com"));
    assert_eq!(
        good.usage.as_ref().and_then(|usage| usage.subscription_title.as_deref()),
        Some("PRO")
    );

    let broken = &run.items[2];
    assert_eq!(broken.status, ItemStatus::Failed);
    assert_eq!(broken.rollback, Some(RollbackOutcome::Success));
    assert!(broken
        .error
        .as_deref()
        .is_some_and(|error| error.contains("usage endpoint unavailable")));

    listing.assert_calls(1);
    create_existing.assert_calls(0);
    create_good.assert_calls(1);
    create_broken.assert_calls(1);
    balance_good.assert_calls(1);
    balance_broken.assert_calls(1);
    disable_good.assert_calls(0);
    disable_broken.assert_calls(1);
    delete_broken.assert_calls(1);

    let summary = run.summary();
    assert_eq!(summary.outcome, BatchOutcome::Mixed);
    assert_eq!(summary.counters.verified, 1);
    assert_eq!(summary.counters.duplicate, 1);
    assert_eq!(summary.counters.failed, 1);
    assert_eq!(summary.counters.rollback_skipped, 1);
    assert!(summary.remediation_required.is_empty());
    assert!(index.contains(&content_hash("rt-good")));
    assert!(!index.contains(&content_hash("rt-broken")));
}

#[tokio::test]
async fn integration_resubmitted_batch_creates_nothing_new() {
    let server = MockServer::start();
    let listing = mock_listing(&server, &[]);
    let create_a = mock_create(&server, "rt-a", 21);
    let create_b = mock_create(&server, "rt-b", 22);
    let balance_a = mock_balance_ok(&server, 21);
    let balance_b = mock_balance_ok(&server, 22);

    let client = registry_client(&server);
    let mut index = load_existing_index(&*client)
        .await
        .expect("index should seed");
    let pipeline = immediate_pipeline(&client);
    let raw = r#"[{"refreshToken":"rt-a","priority":2},{"refreshToken":"rt-b","region":"eu-west-1"}]"#;

    let (_, first) = pipeline
        .run_text(raw, &mut index)
        .await
        .expect("flat batch should parse");
    assert_eq!(first.summary().outcome, BatchOutcome::FullySuccessful);
    assert_eq!(index.len(), 2);

    let (_, second) = pipeline
        .run_text(raw, &mut index)
        .await
        .expect("flat batch should parse");
    assert_eq!(second.counters.duplicate, 2);
    assert_eq!(second.items[0].duplicate_of, Some(21));

    listing.assert_calls(1);
    create_a.assert_calls(1);
    create_b.assert_calls(1);
    balance_a.assert_calls(1);
    balance_b.assert_calls(1);
}

#[tokio::test]
async fn integration_failed_disable_leaves_credential_for_manual_cleanup() {
    let server = MockServer::start();
    mock_listing(&server, &[]);
    let create = mock_create(&server, "rt-stuck", 31);
    let balance = mock_balance_error(&server, 31);
    let disable = mock_disable(&server, 31, 503);
    let delete = mock_delete(&server, 31);

    let client = registry_client(&server);
    let mut index = load_existing_index(&*client)
        .await
        .expect("index should seed");
    let pipeline = immediate_pipeline(&client);

    let (parsed, run) = pipeline
        .run_text(r#"{"refreshToken":"rt-stuck"}"#, &mut index)
        .await
        .expect("single object should parse");

    create.assert_calls(1);
    balance.assert_calls(1);
    disable.assert_calls(1);
    delete.assert_calls(0);

    match &run.items[0].rollback {
        Some(RollbackOutcome::Failed { stage, error }) => {
            assert_eq!(*stage, RollbackStage::Disable);
            assert!(error.contains("failed to disable credential 31"));
        }
        other => panic!("expected failed rollback, got {other:?}"),
    }
    let summary = run.summary();
    assert_eq!(summary.remediation_required, vec![31]);

    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("report.json");
    let report = OnboardingReport::new(client.base_url(), &parsed, &run);
    write_report_atomic(&path, &report).expect("report should be written");
    let raw_report = std::fs::read_to_string(&path).expect("read report");
    assert!(!raw_report.contains("rt-stuck"));
    let json: serde_json::Value = serde_json::from_str(&raw_report).expect("report json");
    assert_eq!(json["summary"]["remediation_required"], json!([31]));
    assert_eq!(json["items"][0]["rollback"]["stage"], "disable");
}

#[tokio::test]
async fn integration_unreachable_registry_fails_before_any_create() {
    let server = MockServer::start();
    let listing = server.mock(|when, then| {
        when.method(GET).path(format!("{ADMIN_PREFIX}/credentials"));
        then.status(401).json_body(json!({
            "error": {"type": "authentication_error", "message": "Invalid or missing admin API key"}
        }));
    });

    let client = registry_client(&server);
    let error = load_existing_index(&*client)
        .await
        .expect_err("seeding should fail");

    listing.assert_calls(1);
    assert!(error
        .to_string()
        .contains("authentication_error: Invalid or missing admin API key"));
}
