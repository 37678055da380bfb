// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::Ordering;
use std::sync::Arc;

use ricebook_server::{build_router, ApiConfig, AppState, FakeMediaStore};
use ricebook_store::DocumentStore;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn spawn_server(api: ApiConfig) -> (std::net::SocketAddr, AppState) {
    let store = Arc::new(DocumentStore::open_in_memory().expect("open store"));
    let state = AppState::with_config(store, Arc::new(FakeMediaStore::new()), api);
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    (addr, state)
}

async fn send(
    addr: std::net::SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(payload) = body {
        req.push_str("Content-Type: application/json\r\n");
        req.push_str(&format!("Content-Length: {}\r\n", payload.len()));
    }
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str("\r\n");
    if let Some(payload) = body {
        req.push_str(payload);
    }
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}

fn registration_body(username: &str) -> String {
    json!({
        "username": username,
        "email": format!("{username}@rice.edu"),
        "dob": "1998-04-12",
        "phone": "713-555-0101",
        "zipcode": "77005",
        "password": "hunter2",
    })
    .to_string()
}

#[tokio::test]
async fn probes_and_version_answer_without_a_session() {
    let (addr, _state) = spawn_server(ApiConfig::default()).await;

    let (status, _, body) = send(addr, "GET", "/", &[], None).await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("landing json");
    assert_eq!(json.get("hello").and_then(Value::as_str), Some("world"));

    let (status, _, body) = send(addr, "GET", "/healthz", &[], None).await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok");

    let (status, _, body) = send(addr, "GET", "/readyz", &[], None).await;
    assert_eq!(status, 200);
    assert_eq!(body, "ready");

    let (status, head, body) = send(addr, "GET", "/version", &[], None).await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("version json");
    assert_eq!(
        json.get("crate").and_then(Value::as_str),
        Some("ricebook-server")
    );
    assert_eq!(json.get("build_hash").and_then(Value::as_str), Some("dev"));
    assert_eq!(
        json.get("config_schema_version").and_then(Value::as_u64),
        Some(1)
    );
    assert!(json.get("version").and_then(Value::as_str).is_some());
    assert!(head.contains("cache-control: public, max-age=30"), "head: {head}");
    assert!(head.contains("x-request-id: "), "head: {head}");
}

#[tokio::test]
async fn metrics_expose_the_request_and_session_counters() {
    let (addr, _state) = spawn_server(ApiConfig::default()).await;

    send(addr, "GET", "/healthz", &[], None).await;
    send(addr, "GET", "/healthz", &[], None).await;
    let (status, _, _) = send(addr, "POST", "/register", &[], Some(&registration_body("alice"))).await;
    assert_eq!(status, 200);
    let login = json!({"username": "alice", "password": "hunter2"}).to_string();
    let (status, _, _) = send(addr, "POST", "/login", &[], Some(&login)).await;
    assert_eq!(status, 200);

    let (status, head, body) = send(addr, "GET", "/metrics", &[], None).await;
    assert_eq!(status, 200);
    assert!(
        head.contains("content-type: text/plain; version=0.0.4"),
        "head: {head}"
    );
    assert!(body.contains("ricebook_build_info"), "body: {body}");
    assert!(body.contains("ricebook_http_requests_total"), "body: {body}");
    assert!(
        body.contains("ricebook_http_request_duration_seconds_bucket"),
        "body: {body}"
    );
    assert!(body.contains("ricebook_sessions_opened_total"), "body: {body}");
    assert!(body.contains("ricebook_sessions_active"), "body: {body}");
}

#[tokio::test]
async fn request_policy_rejects_oversized_uris_and_headers() {
    let api = ApiConfig {
        max_uri_bytes: 256,
        max_header_bytes: 512,
        ..ApiConfig::default()
    };
    let (addr, _state) = spawn_server(api).await;

    let long_path = format!("/healthz?pad={}", "x".repeat(400));
    let (status, _, body) = send(addr, "GET", &long_path, &[], None).await;
    assert_eq!(status, 400);
    assert!(body.contains("QueryRejectedByPolicy"), "body: {body}");
    assert!(body.contains("request URI too large"), "body: {body}");

    let oversized = "v".repeat(600);
    let (status, _, body) = send(addr, "GET", "/healthz", &[("X-Probe", &oversized)], None).await;
    assert_eq!(status, 400);
    assert!(body.contains("request headers too large"), "body: {body}");

    // Both rejections land in the policy counter, split by policy label.
    let (_, _, metrics) = send(addr, "GET", "/metrics", &[], None).await;
    assert!(metrics.contains("ricebook_policy_violations_total"), "{metrics}");
    assert!(metrics.contains("policy=\"uri_bytes\""), "{metrics}");
    assert!(metrics.contains("policy=\"header_bytes\""), "{metrics}");
}

#[tokio::test]
async fn json_bodies_over_the_cap_are_rejected_outright() {
    let api = ApiConfig {
        max_body_bytes: 256,
        ..ApiConfig::default()
    };
    let (addr, _state) = spawn_server(api).await;

    let (status, _, _) = send(addr, "POST", "/register", &[], Some(&registration_body("alice"))).await;
    assert_eq!(status, 200, "a small body still fits the cap");

    let padded = json!({
        "username": "bob",
        "email": "bob@rice.edu",
        "dob": "1998-04-12",
        "phone": "713-555-0101",
        "zipcode": "77005",
        "password": "p".repeat(600),
    })
    .to_string();
    let (status, _, _) = send(addr, "POST", "/register", &[], Some(&padded)).await;
    assert_eq!(status, 413);
}

#[tokio::test]
async fn readiness_follows_the_accepting_flag() {
    let (addr, state) = spawn_server(ApiConfig::default()).await;

    let (status, _, body) = send(addr, "GET", "/readyz", &[], None).await;
    assert_eq!(status, 200);
    assert_eq!(body, "ready");

    state.accepting_requests.store(false, Ordering::Relaxed);

    let (status, _, body) = send(addr, "GET", "/readyz", &[], None).await;
    assert_eq!(status, 503);
    assert_eq!(body, "not-ready");

    // Liveness keeps answering while the instance drains.
    let (status, _, _) = send(addr, "GET", "/healthz", &[], None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn cors_reflects_only_allow_listed_origins() {
    let api = ApiConfig {
        cors_allowed_origins: vec!["https://app.ricebook.example".to_string()],
        ..ApiConfig::default()
    };
    let (addr, _state) = spawn_server(api).await;

    let (status, head, _) = send(
        addr,
        "GET",
        "/healthz",
        &[("Origin", "https://app.ricebook.example")],
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert!(
        head.contains("access-control-allow-origin: https://app.ricebook.example"),
        "head: {head}"
    );
    assert!(
        head.contains("access-control-allow-credentials: true"),
        "head: {head}"
    );

    let (status, head, _) = send(
        addr,
        "GET",
        "/healthz",
        &[("Origin", "https://evil.example")],
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert!(
        !head.contains("access-control-allow-origin"),
        "unlisted origins get no grant: {head}"
    );

    // Preflight answers before the session guard can 401 it.
    let (status, head, _) = send(
        addr,
        "OPTIONS",
        "/articles",
        &[
            ("Origin", "https://app.ricebook.example"),
            ("Access-Control-Request-Method", "GET"),
        ],
        None,
    )
    .await;
    assert_eq!(status, 204);
    assert!(
        head.contains("access-control-allow-methods: GET,POST,PUT,DELETE,OPTIONS"),
        "head: {head}"
    );

    let (status, head, _) = send(
        addr,
        "OPTIONS",
        "/articles",
        &[
            ("Origin", "https://evil.example"),
            ("Access-Control-Request-Method", "GET"),
        ],
        None,
    )
    .await;
    assert_eq!(status, 204);
    assert!(!head.contains("access-control-allow-origin"), "head: {head}");
}
