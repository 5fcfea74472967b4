//! Webhook integration tests.
//!
//! Covers payload field extraction, rejection of malformed bodies, scope
//! handling and signature verification.

mod common;

use common::{mkv_bytes, TestHarness};
use omniscan::server::auth::sign_body;
use omniscan::server::routes_webhook::SIGNATURE_HEADER;
use serde_json::{json, Value};

async fn post_json(addr: std::net::SocketAddr, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/webhook"))
        .json(body)
        .send()
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Accepted payloads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn radarr_download_queues_movie_directory() {
    let (h, addr) = TestHarness::with_server().await;
    let movie_dir = h.mkdir("Inception (2010)");
    let movie_file = h.write("Inception (2010)/Inception.2010.mkv", &mkv_bytes());

    let payload = json!({
        "eventType": "Download",
        "movie": {"title": "Inception", "folderPath": movie_dir.to_str().unwrap()},
        "movieFile": {"path": movie_file.to_str().unwrap(), "quality": "Bluray-1080p"}
    });

    let resp = post_json(addr, &payload).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["accepted"].as_array().unwrap().len(), 2);
    assert!(body["ignored"].as_array().unwrap().is_empty());

    let pending = h.scheduler.pending_buckets().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].directory, movie_dir);
}

#[tokio::test]
async fn generic_paths_split_accepted_and_ignored() {
    let (h, addr) = TestHarness::with_server().await;
    let inside = h.write("Show/e1.mkv", &mkv_bytes());

    let payload = json!({
        "paths": [inside.to_str().unwrap(), "/somewhere/else/e2.mkv"]
    });

    let resp = post_json(addr, &payload).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["accepted"], json!([inside.to_str().unwrap()]));
    assert_eq!(body["ignored"], json!(["/somewhere/else/e2.mkv"]));
}

#[tokio::test]
async fn all_out_of_scope_is_ignored() {
    let (h, addr) = TestHarness::with_server().await;

    let resp = post_json(addr, &json!({"path": "/not/watched/movie.mkv"})).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ignored");
    assert!(h.scheduler.pending_buckets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_event_is_acknowledged() {
    let (h, addr) = TestHarness::with_server().await;

    let resp = post_json(addr, &json!({"eventType": "Test"})).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ignored");
    assert!(h.scheduler.pending_buckets().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_payloads_are_400() {
    let (_h, addr) = TestHarness::with_server().await;

    let cases = [
        (json!(["/media/a.mkv"]), "invalid_payload"),
        (json!({"path": 7}), "invalid_field"),
        (json!({"eventType": "Download"}), "missing_path"),
        (json!({"path": "relative/a.mkv"}), "invalid_path"),
    ];
    for (payload, code) in cases {
        let resp = post_json(addr, &payload).await;
        assert_eq!(resp.status(), 400, "payload {payload}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], code, "payload {payload}");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn invalid_json_is_400() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/webhook"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_json");
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signature_is_enforced_when_enabled() {
    let secret = "test-webhook-secret";
    let (h, addr) = TestHarness::with_server_config(|c| {
        c.server.webhook_security.signature_verification = true;
        c.server.webhook_security.signature_secret = Some(secret.to_string());
    })
    .await;
    let file = h.write("Show/e1.mkv", &mkv_bytes());
    let body = serde_json::to_vec(&json!({"path": file.to_str().unwrap()})).unwrap();
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/webhook");

    // Missing header
    let resp = client.post(&url).body(body.clone()).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    // Wrong signature
    let bad = sign_body("another-secret", &body).unwrap();
    let resp = client
        .post(&url)
        .header(SIGNATURE_HEADER, bad)
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert!(h.scheduler.pending_buckets().await.unwrap().is_empty());

    // Correct signature
    let good = sign_body(secret, &body).unwrap();
    let resp = client
        .post(&url)
        .header(SIGNATURE_HEADER, good)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(h.scheduler.pending_buckets().await.unwrap().len(), 1);
}
