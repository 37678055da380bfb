// SPDX-License-Identifier: Apache-2.0

//! Operational surface: landing page, probes, version, metrics.

use crate::http::support::{finish, propagated_request_id};
use crate::telemetry::metrics::render_prometheus;
use crate::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Instant;

pub(crate) async fn landing_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = (StatusCode::OK, Json(json!({"hello": "world"}))).into_response();
    finish(&state, "/", started, &request_id, resp).await
}

pub(crate) async fn healthz_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let resp = (StatusCode::OK, "ok").into_response();
    finish(&state, "/healthz", started, &request_id, resp).await
}

/// Ready only when startup finished and the listener is not draining.
pub(crate) async fn readyz_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let ready = state.ready.load(Ordering::Relaxed) && state.accepting_requests.load(Ordering::Relaxed);
    let resp = if ready {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not-ready").into_response()
    };
    finish(&state, "/readyz", started, &request_id, resp).await
}

pub(crate) async fn version_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let payload = json!({
        "crate": crate::CRATE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "build_hash": option_env!("RICEBOOK_BUILD_HASH").unwrap_or("dev"),
        "config_schema_version": crate::config::CONFIG_SCHEMA_VERSION,
    });
    let mut resp = (StatusCode::OK, Json(payload)).into_response();
    resp.headers_mut().insert(
        "cache-control",
        HeaderValue::from_static("public, max-age=30"),
    );
    finish(&state, "/version", started, &request_id, resp).await
}

pub(crate) async fn metrics_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let body = render_prometheus(&state).await;
    let mut resp = (StatusCode::OK, body).into_response();
    resp.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    finish(&state, "/metrics", started, &request_id, resp).await
}
