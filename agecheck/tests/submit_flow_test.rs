//! Submitter-side tests against a mock vendor API.
//!
//! The mock pins the exact Authorization header, which only matches when the
//! client signs the same bytes it sends.

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use agecheck::client::{
    batch_id_of, save_job_details, ApiRejection, BatchRequest, VerifyMyAgeClient,
};
use agecheck::monitor;
use agecheck::signature::{auth_header, sign_payload};

fn mock_client(server: &MockServer) -> VerifyMyAgeClient {
    VerifyMyAgeClient::with_credentials(
        format!("http://{}", server.address()),
        "test-key".to_string(),
        "test-secret".to_string(),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn batch_submit_posts_once_with_signed_body() {
    let server = MockServer::start();

    // Recompute the signature over the exact body the client serializes
    let request = BatchRequest {
        file_url: "https://raw.example.com/emails.csv".to_string(),
        callback_url: "https://tunnel.example.com/callback".to_string(),
    };
    let body = serde_json::to_string(&request).unwrap();
    let signature = sign_payload("test-secret", &body);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/estimate/batch")
            .header("authorization", auth_header("test-key", &signature))
            .header("content-type", "application/json")
            .json_body(json!({
                "file_url": "https://raw.example.com/emails.csv",
                "callback_url": "https://tunnel.example.com/callback"
            }));
        then.status(200).json_body(json!({
            "batch_id": "batch-123",
            "status": "processing"
        }));
    });

    let client = mock_client(&server);
    let ack = client
        .create_batch_job(
            "https://raw.example.com/emails.csv",
            "https://tunnel.example.com/callback",
        )
        .await
        .unwrap();

    // Exactly one POST went out
    mock.assert();
    assert_eq!(batch_id_of(&ack), "batch-123");
    assert_eq!(ack["status"], "processing");
}

#[tokio::test]
async fn vendor_rejection_is_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/v1/estimate/batch");
        then.status(401).body(r#"{"error":"bad signature"}"#);
    });

    let client = mock_client(&server);
    let err = client
        .create_batch_job(
            "https://raw.example.com/emails.csv",
            "https://tunnel.example.com/callback",
        )
        .await
        .unwrap_err();

    let rejection = err
        .downcast_ref::<ApiRejection>()
        .expect("typed rejection for non-success status");
    assert_eq!(rejection.status, 401);
    assert!(rejection.body.contains("bad signature"));

    // Still exactly one call after the failure
    mock.assert();
}

#[tokio::test]
async fn ack_with_non_string_fields_is_accepted() {
    let server = MockServer::start();
    // Some acks carry a numeric status and only an "id" field
    server.mock(|when, then| {
        when.method(POST).path("/api/v1/estimate/batch");
        then.status(200).json_body(json!({"id": "x9", "status": 7}));
    });

    let client = mock_client(&server);
    let ack = client
        .create_batch_job(
            "https://raw.example.com/emails.csv",
            "https://tunnel.example.com/callback",
        )
        .await
        .unwrap();

    assert_eq!(batch_id_of(&ack), "x9");
    assert_eq!(ack["status"], 7);
}

#[tokio::test]
async fn estimate_posts_single_email() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/estimate")
            .header_exists("authorization")
            .json_body(json!({"email": "alice@example.com"}));
        then.status(200).json_body(json!({
            "minimum_age": 25,
            "is_adult": true
        }));
    });

    let client = mock_client(&server);
    let reply = client.estimate("alice@example.com").await.unwrap();

    mock.assert();
    assert_eq!(reply["is_adult"], true);
    assert_eq!(reply["minimum_age"], 25);
}

#[tokio::test]
async fn webhook_preflight_reports_reachability() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).body("ok");
    });

    let client = mock_client(&server);
    assert!(
        client
            .webhook_reachable(&format!("http://{}", server.address()))
            .await
    );
    // Nothing listens on port 1
    assert!(!client.webhook_reachable("http://127.0.0.1:1/").await);
}

#[tokio::test]
async fn poll_returns_newest_payload() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/webhooks");
        then.status(200).json_body(json!([
            {"batch_id": "b1", "report_url": "https://x/old.csv"},
            {"batch_id": "b2", "report_url": "https://x/new.csv"}
        ]));
    });

    let poller = reqwest::Client::new();
    let payload = monitor::poll_for_callbacks(
        &poller,
        &format!("http://{}", server.address()),
        Duration::from_millis(500),
        Duration::from_millis(50),
    )
    .await
    .expect("a callback should be found");

    assert_eq!(payload["batch_id"], "b2");
}

#[tokio::test]
async fn poll_times_out_on_empty_history() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/webhooks");
        then.status(200).json_body(json!([]));
    });

    let poller = reqwest::Client::new();
    let payload = monitor::poll_for_callbacks(
        &poller,
        &format!("http://{}", server.address()),
        Duration::from_millis(200),
        Duration::from_millis(50),
    )
    .await;

    assert!(payload.is_none());
}

#[tokio::test]
async fn report_download_saves_csv() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/report.csv");
        then.status(200)
            .body("email,minimum_age,is_adult,verification_id\nalice@example.com,25,true,v1\n");
    });

    let dir = TempDir::new().unwrap();
    let downloader = reqwest::Client::new();
    let path = monitor::download_report(
        &downloader,
        &format!("http://{}/report.csv", server.address()),
        dir.path(),
    )
    .await
    .unwrap();

    let saved = std::fs::read_to_string(path).unwrap();
    assert!(saved.starts_with("email,minimum_age"));
    assert!(saved.contains("alice@example.com"));
}

#[tokio::test]
async fn delayed_report_downloads_with_uncapped_client() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/report.csv");
        then.status(200)
            .delay(Duration::from_millis(400))
            .body("email,minimum_age,is_adult,verification_id\nalice@example.com,25,true,v1\n");
    });
    let url = format!("http://{}/report.csv", server.address());

    let dir = TempDir::new().unwrap();

    // A short per-client timeout gives up on the delayed body
    let capped = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    assert!(monitor::download_report(&capped, &url, dir.path()).await.is_err());

    // The default client has no overall timeout and gets the report
    let downloader = reqwest::Client::new();
    let path = monitor::download_report(&downloader, &url, dir.path())
        .await
        .unwrap();
    assert!(std::fs::read_to_string(path)
        .unwrap()
        .contains("alice@example.com"));
}

#[tokio::test]
async fn report_download_fails_on_expired_link() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/report.csv");
        then.status(403).body("expired");
    });

    let dir = TempDir::new().unwrap();
    let downloader = reqwest::Client::new();
    let err = monitor::download_report(
        &downloader,
        &format!("http://{}/report.csv", server.address()),
        dir.path(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("403"));
}

#[test]
fn job_record_keeps_submission_context() {
    let dir = TempDir::new().unwrap();
    let ack = json!({"batch_id": "b9", "status": "queued"});

    let path = save_job_details(
        dir.path(),
        &ack,
        "https://raw.example.com/emails.csv",
        "https://tunnel.example.com/callback",
    )
    .unwrap();

    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(record["batch_id"], "b9");
    assert_eq!(record["job_info"]["status"], "queued");
    assert_eq!(record["csv_url"], "https://raw.example.com/emails.csv");
    assert_eq!(record["callback_url"], "https://tunnel.example.com/callback");
}
