// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use ricebook_server::{build_router, ApiConfig, AppState, FakeMediaStore};
use ricebook_store::DocumentStore;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn spawn_server() -> std::net::SocketAddr {
    let api = ApiConfig {
        auth_rate_capacity: 100.0,
        ..ApiConfig::default()
    };
    let store = Arc::new(DocumentStore::open_in_memory().expect("open store"));
    let state = AppState::with_config(store, Arc::new(FakeMediaStore::new()), api);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    addr
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

async fn register_and_login(addr: std::net::SocketAddr, username: &str) -> String {
    let body = json!({
        "username": username,
        "email": format!("{username}@rice.edu"),
        "dob": "1998-04-12",
        "phone": "713-555-0101",
        "zipcode": "77005",
        "password": "hunter2",
    })
    .to_string();
    let (status, _, _) = send(addr, "POST", "/register", &[], Some(&body)).await;
    assert_eq!(status, 200, "register {username}");
    let login = json!({"username": username, "password": "hunter2"}).to_string();
    let (status, head, _) = send(addr, "POST", "/login", &[], Some(&login)).await;
    assert_eq!(status, 200, "login {username}");
    cookie_pair(&head)
}

fn cookie_pair(head: &str) -> String {
    head.lines()
        .find_map(|line| line.strip_prefix("set-cookie: "))
        .expect("session cookie")
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

fn error_code(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .expect("error json")
        .pointer("/error/code")
        .and_then(Value::as_str)
        .expect("error code")
        .to_string()
}

#[tokio::test]
async fn google_sign_up_then_sign_in_reuses_the_account() {
    let addr = spawn_server().await;
    let assertion = json!({
        "uid": "g-1001",
        "displayName": "Jane Doe",
        "email": "jane.doe@gmail.example",
        "photoURL": "https://photos.example/jane.jpg",
    })
    .to_string();

    let (status, head, body) = send(addr, "POST", "/auth/googleRegister", &[], Some(&assertion)).await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("session json");
    assert_eq!(json.get("username").and_then(Value::as_str), Some("jane_doe"));
    assert_eq!(json.get("result").and_then(Value::as_str), Some("success"));
    let cookie = cookie_pair(&head);
    assert!(cookie.starts_with("sid="));

    let (status, _, _) = send(addr, "GET", "/articles", &[("Cookie", &cookie)], None).await;
    assert_eq!(status, 200, "google session passes the guard");

    // The asserted photo becomes the avatar directly.
    let (_, _, body) = send(addr, "GET", "/avatar", &[("Cookie", &cookie)], None).await;
    let json: Value = serde_json::from_str(&body).expect("avatar json");
    assert_eq!(
        json.get("avatar").and_then(Value::as_str),
        Some("https://photos.example/jane.jpg")
    );

    // A second assertion for the same uid signs in rather than forking a handle.
    let again = json!({"uid": "g-1001", "displayName": "J. Doe Renamed"}).to_string();
    let (status, head, body) = send(addr, "POST", "/auth/googleRegister", &[], Some(&again)).await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("session json");
    assert_eq!(json.get("username").and_then(Value::as_str), Some("jane_doe"));
    assert!(cookie_pair(&head).starts_with("sid="));
}

#[tokio::test]
async fn google_assertions_validate() {
    let addr = spawn_server().await;

    let (status, _, body) = send(addr, "POST", "/auth/googleRegister", &[], Some("{}")).await;
    assert_eq!(status, 400);
    assert!(body.contains("uid is required"), "body: {body}");

    let numeric = json!({"uid": 42}).to_string();
    let (status, _, body) = send(addr, "POST", "/auth/googleRegister", &[], Some(&numeric)).await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "InvalidFieldValue");

    let spaced = json!({"uid": "has space"}).to_string();
    let (status, _, _) = send(addr, "POST", "/auth/googleRegister", &[], Some(&spaced)).await;
    assert_eq!(status, 400);

    let (status, _, body) = send(addr, "POST", "/auth/googleRegister", &[], Some("{nope")).await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "InvalidRequestBody");
}

#[tokio::test]
async fn linking_attaches_once_and_conflicts_across_accounts() {
    let addr = spawn_server().await;
    let alice = register_and_login(addr, "alice").await;
    let bob = register_and_login(addr, "bob").await;
    let assertion = json!({"uid": "g-7", "displayName": "Alice W"}).to_string();

    let (status, _, _) = send(addr, "POST", "/linkThirdPartyUser", &[], Some(&assertion)).await;
    assert_eq!(status, 401, "linking requires a session");

    let (status, _, body) = send(
        addr,
        "POST",
        "/linkThirdPartyUser",
        &[("Cookie", &alice)],
        Some(&assertion),
    )
    .await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("link json");
    assert_eq!(json.get("username").and_then(Value::as_str), Some("alice"));
    assert_eq!(json.get("result").and_then(Value::as_str), Some("success"));

    // Linking the uid you already hold is a quiet success.
    let (status, _, body) = send(
        addr,
        "POST",
        "/linkThirdPartyUser",
        &[("Cookie", &alice)],
        Some(&assertion),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body.contains("success"));

    let (status, _, body) = send(
        addr,
        "POST",
        "/linkThirdPartyUser",
        &[("Cookie", &bob)],
        Some(&assertion),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(error_code(&body), "IdentityAlreadyLinked");
}

#[tokio::test]
async fn unlink_keeps_password_accounts() {
    let addr = spawn_server().await;
    let alice = register_and_login(addr, "alice").await;
    let auth = [("Cookie", alice.as_str())];
    let assertion = json!({"uid": "g-9"}).to_string();
    let (status, _, _) = send(addr, "POST", "/linkThirdPartyUser", &auth, Some(&assertion)).await;
    assert_eq!(status, 200);

    // Only the caller can claim the unlink.
    let (status, _, _) = send(
        addr,
        "DELETE",
        "/unlinkThirdPartyUser",
        &auth,
        Some(&json!({"username": "bob"}).to_string()),
    )
    .await;
    assert_eq!(status, 403);

    let (status, _, body) = send(addr, "DELETE", "/unlinkThirdPartyUser", &auth, Some("{}")).await;
    assert_eq!(status, 400);
    assert!(body.contains("username is required"), "body: {body}");

    let claim = json!({"username": "alice"}).to_string();
    let (status, _, body) = send(addr, "DELETE", "/unlinkThirdPartyUser", &auth, Some(&claim)).await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("unlink json");
    assert_eq!(
        json.get("result").and_then(Value::as_str),
        Some("google account unlinked")
    );

    let (status, _, body) = send(addr, "DELETE", "/unlinkThirdPartyUser", &auth, Some(&claim)).await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "NoLinkedIdentity");

    // The password account itself is untouched.
    let (status, _, _) = send(addr, "GET", "/articles", &auth, None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn unlink_deletes_google_only_accounts() {
    let addr = spawn_server().await;
    let alice = register_and_login(addr, "alice").await;
    let assertion = json!({"uid": "g-solo", "displayName": "Solo Rider"}).to_string();
    let (status, head, body) =
        send(addr, "POST", "/auth/googleRegister", &[], Some(&assertion)).await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("session json");
    assert_eq!(
        json.get("username").and_then(Value::as_str),
        Some("solo_rider")
    );
    let solo = cookie_pair(&head);

    let claim = json!({"username": "solo_rider"}).to_string();
    let (status, head, body) = send(
        addr,
        "DELETE",
        "/unlinkThirdPartyUser",
        &[("Cookie", &solo)],
        Some(&claim),
    )
    .await;
    assert_eq!(status, 200);
    let json: Value = serde_json::from_str(&body).expect("unlink json");
    assert_eq!(
        json.get("result").and_then(Value::as_str),
        Some("user and profile deleted")
    );
    let cleared = cookie_pair(&head);
    assert!(cleared.starts_with("sid=;") || cleared == "sid=");
    assert!(head.contains("Max-Age=0"), "head: {head}");

    // Everything about the account is gone: session, profile, posts access.
    let (status, _, _) = send(addr, "GET", "/articles", &[("Cookie", &solo)], None).await;
    assert_eq!(status, 401);
    let (status, _, _) = send(
        addr,
        "GET",
        "/email/solo_rider",
        &[("Cookie", &alice)],
        None,
    )
    .await;
    assert_eq!(status, 404);
}
