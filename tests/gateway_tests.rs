//! Integration tests for the upload gateway.
//!
//! These tests bind the full router (with an in-memory storage accessor in
//! place of GCS) to a real listener and drive it with reqwest, so the
//! connection-level denial behavior is exercised end to end: a denied
//! request must yield a closed connection with no parseable HTTP response.
//!
//! The 404 fallback (when no connection-level control exists) is covered by
//! driving the router directly with `tower::ServiceExt::oneshot`, which is
//! exactly the transport situation the fallback exists for.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use reqwest::Client;
use serde_json::json;
use tokio::net::TcpListener;

use upload_gateway::error::{AppError, AppResult};
use upload_gateway::{AppState, Config, StorageAccessor, build_router, server};

// =============================================================================
// Test Harness
// =============================================================================

/// In-memory storage accessor standing in for GCS.
#[derive(Default)]
struct MockStorage {
    uploads: AtomicUsize,
    signed_urls: AtomicUsize,
}

#[async_trait]
impl StorageAccessor for MockStorage {
    async fn store_object(&self, original_filename: &str, _data: Bytes) -> AppResult<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "https://storage.googleapis.com/test-bucket/{original_filename}"
        ))
    }

    async fn signed_put_url(&self, object: &str, _content_type: &str) -> AppResult<String> {
        self.signed_urls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "https://storage.googleapis.com/test-bucket/{object}?X-Goog-Signature=test"
        ))
    }
}

/// Storage accessor whose operations always fail, for the upstream-error path.
struct FailingStorage;

#[async_trait]
impl StorageAccessor for FailingStorage {
    async fn store_object(&self, _original_filename: &str, _data: Bytes) -> AppResult<String> {
        Err(AppError::StorageError(
            "bucket credentials rejected".to_string(),
        ))
    }

    async fn signed_put_url(&self, _object: &str, _content_type: &str) -> AppResult<String> {
        Err(AppError::StorageError(
            "bucket credentials rejected".to_string(),
        ))
    }
}

/// Install the process-wide Prometheus recorder once; every test shares it,
/// so counter assertions use unique label values per test.
fn metrics_handle() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("install Prometheus recorder")
        })
        .clone()
}

/// Start a gateway on an ephemeral port and return its address plus the
/// mock storage for call-count assertions.
async fn spawn_gateway(config: Config) -> (SocketAddr, Arc<MockStorage>) {
    let storage = Arc::new(MockStorage::default());
    let state = AppState::new(storage.clone(), None, config, metrics_handle());
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, app));

    (addr, storage)
}

/// Start a gateway whose storage accessor always fails.
async fn spawn_failing_gateway(config: Config) -> SocketAddr {
    let state = AppState::new(Arc::new(FailingStorage), None, config, metrics_handle());
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, app));

    addr
}

fn client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn image_form() -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(vec![0x89, b'P', b'N', b'G'])
        .file_name("photo.png")
        .mime_str("image/png")
        .unwrap();
    reqwest::multipart::Form::new().part("image", part)
}

fn protected_config(api_key: &str) -> Config {
    Config {
        api_key: Some(api_key.to_string()),
        ..Config::default()
    }
}

// =============================================================================
// Public Routes
// =============================================================================

#[tokio::test]
async fn health_check_is_reachable_without_credentials() {
    let (addr, _) = spawn_gateway(protected_config("secret")).await;

    let response = client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn metrics_route_is_reachable_without_credentials() {
    let (addr, _) = spawn_gateway(protected_config("secret")).await;

    let response = client()
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

// =============================================================================
// API Key Gate
// =============================================================================

#[tokio::test]
async fn missing_api_key_yields_no_http_response() {
    let (addr, storage) = spawn_gateway(protected_config("secret")).await;

    let result = client()
        .post(format!("http://{addr}/upload"))
        .multipart(image_form())
        .send()
        .await;

    // The connection is closed without a status line; reqwest cannot parse
    // a response out of it
    assert!(result.is_err(), "denied request must not yield a response");
    assert_eq!(storage.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_api_key_yields_no_http_response() {
    let (addr, storage) = spawn_gateway(protected_config("secret")).await;

    let result = client()
        .post(format!("http://{addr}/upload"))
        .header("x-api-key", "not-the-secret")
        .multipart(image_form())
        .send()
        .await;

    assert!(result.is_err(), "denied request must not yield a response");
    assert_eq!(storage.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn correct_api_key_forwards_to_handler() {
    let (addr, storage) = spawn_gateway(protected_config("secret")).await;

    let response = client()
        .post(format!("http://{addr}/upload"))
        .header("x-api-key", "secret")
        .multipart(image_form())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(
        body["url"]
            .as_str()
            .unwrap()
            .starts_with("https://storage.googleapis.com/test-bucket/")
    );
    assert_eq!(storage.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_configured_key_disables_authentication() {
    // No API key: the protected routes are open - an intentional
    // configuration for trusted networks
    let (addr, storage) = spawn_gateway(Config::default()).await;

    let response = client()
        .post(format!("http://{addr}/upload"))
        .multipart(image_form())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(storage.uploads.load(Ordering::SeqCst), 1);
}

// =============================================================================
// IP Allowlist Gate
// =============================================================================

#[tokio::test]
async fn allowlisted_cidr_member_is_forwarded() {
    let config = Config {
        allowed_ips: vec!["203.0.113.0/24".to_string()],
        ..protected_config("secret")
    };
    let (addr, _) = spawn_gateway(config).await;

    let response = client()
        .post(format!("http://{addr}/upload"))
        .header("x-api-key", "secret")
        .header("cf-connecting-ip", "203.0.113.5")
        .multipart(image_form())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn ip_outside_allowlist_yields_no_http_response() {
    let config = Config {
        allowed_ips: vec!["198.51.100.0/24".to_string()],
        ..protected_config("secret")
    };
    let (addr, storage) = spawn_gateway(config).await;

    let result = client()
        .post(format!("http://{addr}/upload"))
        .header("x-api-key", "secret")
        .header("cf-connecting-ip", "203.0.113.5")
        .multipart(image_form())
        .send()
        .await;

    assert!(result.is_err(), "denied request must not yield a response");
    assert_eq!(storage.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn identity_resolution_prefers_cf_connecting_ip() {
    // Allowlist admits only the CF-Connecting-IP value; if X-Forwarded-For
    // took priority the request would be denied
    let config = Config {
        allowed_ips: vec!["1.1.1.1".to_string()],
        ..protected_config("secret")
    };
    let (addr, _) = spawn_gateway(config).await;

    let response = client()
        .post(format!("http://{addr}/upload"))
        .header("x-api-key", "secret")
        .header("cf-connecting-ip", "1.1.1.1")
        .header("x-forwarded-for", "2.2.2.2")
        .multipart(image_form())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    // And the reverse: an allowlist admitting only the XFF value denies,
    // because CF-Connecting-IP still wins
    let config = Config {
        allowed_ips: vec!["2.2.2.2".to_string()],
        ..protected_config("secret")
    };
    let (addr, _) = spawn_gateway(config).await;

    let result = client()
        .post(format!("http://{addr}/upload"))
        .header("x-api-key", "secret")
        .header("cf-connecting-ip", "1.1.1.1")
        .header("x-forwarded-for", "2.2.2.2")
        .multipart(image_form())
        .send()
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn transport_peer_address_satisfies_loopback_allowlist() {
    // No proxy headers at all: identity falls back to the TCP peer address,
    // which for this test is 127.0.0.1
    let config = Config {
        allowed_ips: vec!["127.0.0.0/8".to_string()],
        ..protected_config("secret")
    };
    let (addr, _) = spawn_gateway(config).await;

    let response = client()
        .post(format!("http://{addr}/upload"))
        .header("x-api-key", "secret")
        .multipart(image_form())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn preflight_is_answered_without_reaching_gates_or_handler() {
    let config = Config {
        cors_allowed_origins: vec!["https://example.com".to_string()],
        ..protected_config("secret")
    };
    let (addr, storage) = spawn_gateway(config).await;

    // No API key on purpose: CORS must short-circuit before the auth gate
    let response = client()
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/upload"))
        .header("origin", "https://example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://example.com"
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-methods")
            .unwrap(),
        "POST, GET, OPTIONS"
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-headers")
            .unwrap(),
        "Content-Type, X-API-Key"
    );
    assert_eq!(response.headers().get("access-control-max-age").unwrap(), "3600");

    let body = response.text().await.unwrap();
    assert!(body.is_empty(), "preflight answer must carry no body");
    assert_eq!(storage.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn allowed_origin_is_reflected() {
    let config = Config {
        cors_allowed_origins: vec!["https://example.com".to_string()],
        ..Config::default()
    };
    let (addr, _) = spawn_gateway(config).await;

    let response = client()
        .get(format!("http://{addr}/health"))
        .header("origin", "https://example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://example.com"
    );
}

#[tokio::test]
async fn disallowed_origin_omits_header_but_still_forwards() {
    let config = Config {
        cors_allowed_origins: vec!["https://other.com".to_string()],
        ..Config::default()
    };
    let (addr, _) = spawn_gateway(config).await;

    let response = client()
        .get(format!("http://{addr}/health"))
        .header("origin", "https://example.com")
        .send()
        .await
        .unwrap();

    // Soft denial: the request went through, only the header is missing
    assert_eq!(response.status(), 200);
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
    // The fixed headers are present on every response
    assert!(
        response
            .headers()
            .get("access-control-allow-methods")
            .is_some()
    );
}

// =============================================================================
// Upload Validation
// =============================================================================

#[tokio::test]
async fn missing_image_field_is_a_descriptive_client_error() {
    let (addr, _) = spawn_gateway(Config::default()).await;

    let form = reqwest::multipart::Form::new().text("not_image", "value");
    let response = client()
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("image"));
}

#[tokio::test]
async fn disallowed_file_extension_is_rejected() {
    let (addr, storage) = spawn_gateway(Config::default()).await;

    let part = reqwest::multipart::Part::bytes(b"#!/bin/sh".to_vec()).file_name("script.sh");
    let form = reqwest::multipart::Form::new().part("image", part);

    let response = client()
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Invalid file type"));
    assert_eq!(storage.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_file_is_rejected() {
    let config = Config {
        max_file_size: 1024, // 1 KiB for the test
        ..Config::default()
    };
    let (addr, storage) = spawn_gateway(config).await;

    let part = reqwest::multipart::Part::bytes(vec![0u8; 4096]).file_name("big.png");
    let form = reqwest::multipart::Form::new().part("image", part);

    let response = client()
        .post(format!("http://{addr}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("too large"));
    assert_eq!(storage.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn storage_failure_surfaces_generic_server_error() {
    let addr = spawn_failing_gateway(Config::default()).await;

    let response = client()
        .post(format!("http://{addr}/upload"))
        .multipart(image_form())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    // Backend details must not leak to the client
    assert!(!body["error"].as_str().unwrap().contains("credentials"));
}

// =============================================================================
// Signed URLs
// =============================================================================

#[tokio::test]
async fn signed_url_issuance_succeeds() {
    let (addr, storage) = spawn_gateway(protected_config("secret")).await;

    let response = client()
        .post(format!("http://{addr}/signedurl"))
        .header("x-api-key", "secret")
        .json(&json!({"filename": "photo.png", "contentType": "image/png"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["url"].as_str().unwrap().contains("photo.png"));
    assert_eq!(storage.signed_urls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn signed_url_requires_filename_and_content_type() {
    let (addr, storage) = spawn_gateway(Config::default()).await;

    let response = client()
        .post(format!("http://{addr}/signedurl"))
        .json(&json!({"filename": "photo.png", "contentType": ""}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("required"));
    assert_eq!(storage.signed_urls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn signed_url_rejects_malformed_json() {
    let (addr, _) = spawn_gateway(Config::default()).await;

    let response = client()
        .post(format!("http://{addr}/signedurl"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn signed_url_issuance_increments_dedicated_counter() {
    let (addr, _) = spawn_gateway(Config::default()).await;

    // Unique client IP so the shared recorder's label set is this test's own
    let response = client()
        .post(format!("http://{addr}/signedurl"))
        .header("cf-connecting-ip", "203.0.113.41")
        .json(&json!({"filename": "photo.png", "contentType": "image/png"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let metrics_text = client()
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let line = metrics_text
        .lines()
        .find(|line| {
            line.starts_with("upload_gateway_signedurl_created_total")
                && line.contains(r#"client_ip="203.0.113.41""#)
        })
        .expect("signed URL counter with this client IP");
    assert!(line.trim_end().ends_with(" 1"));
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn forwarded_requests_are_counted_with_full_label_set() {
    let (addr, _) = spawn_gateway(Config::default()).await;

    // Three uploads from one (unique) client IP
    for _ in 0..3 {
        let response = client()
            .post(format!("http://{addr}/upload"))
            .header("cf-connecting-ip", "203.0.113.77")
            .multipart(image_form())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let metrics_text = client()
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let line = metrics_text
        .lines()
        .find(|line| {
            line.starts_with("upload_gateway_http_requests_total")
                && line.contains(r#"method="POST""#)
                && line.contains(r#"endpoint="/upload""#)
                && line.contains(r#"status_code="200""#)
                && line.contains(r#"client_ip="203.0.113.77""#)
        })
        .expect("request counter with this label set");
    assert!(line.trim_end().ends_with(" 3"));
}

#[tokio::test]
async fn metrics_route_never_counts_itself() {
    let (addr, _) = spawn_gateway(Config::default()).await;

    // Scrape twice; neither request may appear in the counters
    for _ in 0..2 {
        client()
            .get(format!("http://{addr}/metrics"))
            .send()
            .await
            .unwrap();
    }

    let metrics_text = client()
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let self_counted = metrics_text.lines().any(|line| {
        line.starts_with("upload_gateway_http_requests_total")
            && line.contains(r#"endpoint="/metrics""#)
    });
    assert!(!self_counted, "/metrics must not feed its own counter");
}

// =============================================================================
// Denial Fallback Without Connection Control
// =============================================================================

mod oneshot_fallback {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    /// Driving the router without the accept loop means no drop handle is
    /// planted; the gates must fall back to a bare 404 with an empty body.
    #[tokio::test]
    async fn denied_request_falls_back_to_empty_404() {
        let storage = Arc::new(MockStorage::default());
        let state = AppState::new(
            storage,
            None,
            protected_config("secret"),
            metrics_handle(),
        );
        let app = build_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("x-api-key", "wrong")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(body.is_empty(), "denial must not carry an error body");
    }

    /// An unregistered route and a denied protected route must be
    /// indistinguishable.
    #[tokio::test]
    async fn denied_route_reads_like_missing_route() {
        let storage = Arc::new(MockStorage::default());
        let state = AppState::new(
            storage,
            None,
            protected_config("secret"),
            metrics_handle(),
        );
        let app = build_router(state);

        let denied = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::empty())
            .unwrap();
        let missing = Request::builder()
            .method("POST")
            .uri("/no-such-route")
            .body(Body::empty())
            .unwrap();

        let denied_response = app.clone().oneshot(denied).await.unwrap();
        let missing_response = app.oneshot(missing).await.unwrap();

        assert_eq!(denied_response.status(), missing_response.status());
    }
}

// =============================================================================
// Route Registration
// =============================================================================

#[tokio::test]
async fn dev_routes_absent_without_dev_bucket() {
    let (addr, _) = spawn_gateway(Config::default()).await;

    let response = client()
        .post(format!("http://{addr}/upload-dev"))
        .multipart(image_form())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}
