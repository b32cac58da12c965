//! Integration tests for the browser-facing HTTP API.
//!
//! Each test binds the daemon on 127.0.0.1:0, points it at a wiremock
//! backend and drives it with reqwest.

use serde_json::json;
use signbridge_core::{ProxyConfig, StoreBackend};
use signbridge_daemon::{ApiState, DaemonConfig, ServerConfig, ServerHandle, start_server};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{any, body_json, header, method, path},
};

struct TestDaemon {
    handle: ServerHandle,
    client: reqwest::Client,
}

impl TestDaemon {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.handle.local_addr(), path)
    }
}

fn config_for(backend: Option<&MockServer>) -> DaemonConfig {
    let backend = match backend {
        Some(server) => ProxyConfig {
            base_url: Some(server.uri()),
            api_key: Some("pk_test".to_string()),
            api_secret: Some("sk_test".to_string()),
            client_id: Some("daemon-test".to_string()),
            ..ProxyConfig::default()
        },
        None => ProxyConfig::default(),
    };

    DaemonConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        store: StoreBackend::Memory,
        allowed_origins: vec!["https://shop.example.com".to_string()],
        backend,
        ..DaemonConfig::default()
    }
}

async fn start(config: DaemonConfig) -> TestDaemon {
    let state = ApiState::from_config(&config).await.unwrap();
    let handle = start_server(&ServerConfig::from(&config), state)
        .await
        .unwrap();
    TestDaemon {
        handle,
        client: reqwest::Client::new(),
    }
}

async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "bearer-1",
            "expiresIn": 3600
        })))
        .mount(server)
        .await;
}

fn signing_request() -> serde_json::Value {
    json!({
        "signer": {
            "first_name": "Kari",
            "last_name": "Nordmann",
            "email": "kari@example.com"
        },
        "product_id": "p-1",
        "supplier_id": "s-1",
        "metadata": {"order": 42, "status": "vip"}
    })
}

#[tokio::test]
async fn test_health_reports_configuration() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;
    let body: serde_json::Value = daemon
        .client
        .get(daemon.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok", "configured": true}));

    let unconfigured = start(config_for(None)).await;
    let body: serde_json::Value = unconfigured
        .client
        .get(unconfigured.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["configured"], false);

    daemon.handle.stop().await.unwrap();
    unconfigured.handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_create_forwards_mapped_payload() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path("/signing-requests"))
        .and(header("Authorization", "Bearer bearer-1"))
        .and(header("X-Correlation-Id", "cid-create"))
        .and(header("X-Idempotency-Key", "idem-1"))
        .and(body_json(json!({
            "SignerFirstName": "Kari",
            "SignerLastName": "Nordmann",
            "SignerEmail": "kari@example.com",
            "ProductId": "p-1",
            "SupplierId": "s-1",
            "Metadata": {"order": 42, "status": "vip"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "RequestId": "r-1",
            "SigningUrl": "https://sign.example.com/s/r-1",
            "Metadata": {"Status": "Gold", "order": 42}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;
    let mut payload = signing_request();
    payload["idempotency_key"] = json!("idem-1");

    let response = daemon
        .client
        .post(daemon.url("/api/signing-requests"))
        .header("X-Correlation-Id", "cid-create")
        .json(&payload)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["x-correlation-id"], "cid-create");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["RequestId"], "r-1");
    assert_eq!(body["request_id"], "r-1");
    assert_eq!(body["signing_url"], "https://sign.example.com/s/r-1");
    assert_eq!(body["metadata"], json!({"Status": "Gold", "order": 42}));
}

#[tokio::test]
async fn test_idempotency_key_header_and_payload_correlation_id() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path("/signing-requests"))
        .and(header("X-Idempotency-Key", "idem-header"))
        .and(header("X-Correlation-Id", "cid-payload"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"RequestId": "r-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;
    let mut payload = signing_request();
    payload["correlation_id"] = json!("cid-payload");

    let response = daemon
        .client
        .post(daemon.url("/api/signing-requests"))
        .header("Idempotency-Key", "idem-header")
        .json(&payload)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["x-correlation-id"], "cid-payload");
}

#[tokio::test]
async fn test_invalid_payload_never_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;
    let mut payload = signing_request();
    payload["product_id"] = json!("");

    let response = daemon
        .client
        .post(daemon.url("/api/signing-requests"))
        .header("X-Correlation-Id", "cid-bad")
        .json(&payload)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "invalid_request");
    assert_eq!(body["error"]["correlation_id"], "cid-bad");
    assert!(body["error"]["message"].as_str().unwrap().contains("product_id"));

    let response = daemon
        .client
        .post(daemon.url("/api/signing-requests"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "invalid_request");
}

#[tokio::test]
async fn test_unsendable_idempotency_key_rejected() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;

    let mut payload = signing_request();
    payload["idempotency_key"] = json!("idem\nkey");
    let response = daemon
        .client
        .post(daemon.url("/api/signing-requests"))
        .header("X-Correlation-Id", "cid-idem")
        .json(&payload)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "invalid_request");
    assert_eq!(body["error"]["correlation_id"], "cid-idem");
    assert!(body["error"]["message"].as_str().unwrap().contains("Idempotency key"));

    let response = daemon
        .client
        .post(daemon.url("/api/signing-requests"))
        .header("Idempotency-Key", "idem key")
        .json(&signing_request())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "invalid_request");

    daemon.handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_get_signing_request() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/signing-requests/r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "RequestId": "r-1",
            "Status": "Completed",
            "CompletedAt": "2026-01-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;
    let response = daemon
        .client
        .get(daemon.url("/api/signing-requests/r-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-correlation-id"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "Completed");
    assert_eq!(body["completed_at"], "2026-01-01T10:00:00Z");
}

#[tokio::test]
async fn test_invalid_request_id_rejected() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;
    let response = daemon
        .client
        .get(daemon.url("/api/signing-requests/r.1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_cancel_returns_no_content() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/signing-requests/r-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;
    let response = daemon
        .client
        .delete(daemon.url("/api/signing-requests/r-1"))
        .header("X-Correlation-Id", "cid-del")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(response.headers()["x-correlation-id"], "cid-del");
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backend_failure_is_normalized() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path("/signing-requests"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "errorCode": "INTEGRATION_NOT_CONFIGURED",
            "message": "BankID is not enabled for this tenant"
        })))
        .mount(&server)
        .await;

    let daemon = start(config_for(Some(&server))).await;
    let response = daemon
        .client
        .post(daemon.url("/api/signing-requests"))
        .json(&signing_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "backend_rejected");
    assert_eq!(body["error"]["backend_status"], 503);
    assert_eq!(body["error"]["code"], "INTEGRATION_NOT_CONFIGURED");
    assert_eq!(body["error"]["message"], "BankID is not enabled for this tenant");
    assert!(body["error"].get("detail").is_none());
}

#[tokio::test]
async fn test_unconfigured_daemon_reports_not_configured() {
    let daemon = start(config_for(None)).await;
    let response = daemon
        .client
        .get(daemon.url("/api/signing-requests/r-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "not_configured");
}

#[tokio::test]
async fn test_cors_preflight_for_allowed_origin() {
    let server = MockServer::start().await;
    let daemon = start(config_for(Some(&server))).await;

    let response = daemon
        .client
        .request(reqwest::Method::OPTIONS, daemon.url("/api/signing-requests"))
        .header("Origin", "https://shop.example.com")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://shop.example.com"
    );
}
