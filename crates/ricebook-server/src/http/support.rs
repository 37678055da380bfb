// SPDX-License-Identifier: Apache-2.0

//! Shared plumbing for the handlers: request-id propagation, the error
//! envelope, session cookies, blocking store access, and tolerant JSON
//! body parsing.

use crate::middleware::normalized_forwarded_for;
use crate::AppState;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ricebook_api::{ApiError, ApiErrorCode};
use ricebook_store::{DocumentStore, StoreError};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

/// Prefers the caller's `x-request-id`, then a `traceparent`, then mints
/// a process-local id.
pub(crate) fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(incoming) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = incoming.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if let Some(traceparent) = headers.get("traceparent").and_then(|v| v.to_str().ok()) {
        let trimmed = traceparent.trim();
        if !trimmed.is_empty() {
            return format!("trace-{trimmed}");
        }
    }
    make_request_id(state)
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub(crate) fn api_error_response(status: StatusCode, err: ApiError) -> Response {
    let body = Json(json!({ "error": err }));
    (status, body).into_response()
}

/// Terminal step of every handler arm: record the latency against the
/// route label and echo the request id.
pub(crate) async fn finish(
    state: &AppState,
    route: &'static str,
    started: Instant,
    request_id: &str,
    response: Response,
) -> Response {
    let status = response.status();
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(response, request_id)
}

/// Runs a closure against the document store on the blocking pool and
/// times it under `op`.
pub(crate) async fn run_store<T, F>(state: &AppState, op: &'static str, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&DocumentStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || f(&store))
        .await
        .unwrap_or_else(|e| Err(StoreError::Backend(format!("store task failed: {e}"))));
    state.metrics.observe_store_op(op, started.elapsed()).await;
    result
}

/// Maps store failures onto the wire contract. `NotFound` keeps the
/// missing noun, conflicts split between the identity-link shape and the
/// generic duplicate, everything else is logged and masked as a 500.
pub(crate) fn store_error_response(err: &StoreError, request_id: &str) -> Response {
    match err {
        StoreError::NotFound(what) => api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found(what).with_request_id(request_id),
        ),
        StoreError::Conflict("google identity") => api_error_response(
            StatusCode::CONFLICT,
            ApiError::new(
                ApiErrorCode::IdentityAlreadyLinked,
                "google account already linked to another user",
                json!({}),
                request_id,
            ),
        ),
        StoreError::Conflict(what) => api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::new(
                ApiErrorCode::AlreadyExists,
                format!("{what} already exists"),
                json!({}),
                request_id,
            ),
        ),
        other => {
            error!(error = %other, "store operation failed");
            api_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal().with_request_id(request_id),
            )
        }
    }
}

/// Rate-limit bucket key for credential routes. Falls back to a shared
/// key when no clean forwarded address is present.
pub(crate) fn client_key(headers: &HeaderMap) -> String {
    normalized_forwarded_for(headers).unwrap_or_else(|| "local".to_string())
}

fn cookie_line(name: &str, secure: bool, token: &str, max_age_secs: u64) -> String {
    let mut cookie = format!("{name}={token}; HttpOnly; Path=/; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure; SameSite=None");
    }
    cookie
}

pub(crate) fn session_cookie(state: &AppState, token: &str, max_age_secs: u64) -> String {
    cookie_line(
        &state.api.cookie_name,
        state.api.cookie_secure,
        token,
        max_age_secs,
    )
}

/// `Max-Age=0` with an empty value; browsers drop the cookie on receipt.
pub(crate) fn clear_session_cookie(state: &AppState) -> String {
    session_cookie(state, "", 0)
}

pub(crate) fn with_set_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().insert("set-cookie", value);
    }
    response
}

/// An empty body reads as `{}` so absent-field checks produce the usual
/// `missing_field` answer instead of a parse error.
pub(crate) fn parse_json_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|e| {
        ApiError::new(
            ApiErrorCode::InvalidRequestBody,
            "request body is not valid JSON",
            json!({"parse_error": e.to_string()}),
            "req-unknown",
        )
    })
}

/// `null` counts as absent; a present non-string value is rejected rather
/// than coerced.
pub(crate) fn required_str_field<'a>(body: &'a Value, name: &str) -> Result<&'a str, ApiError> {
    match body.get(name) {
        None | Some(Value::Null) => Err(ApiError::missing_field(name)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ApiError::invalid_field(name, "must be a string")),
    }
}

pub(crate) fn optional_str_field<'a>(body: &'a Value, name: &str) -> Result<Option<&'a str>, ApiError> {
    match body.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ApiError::invalid_field(name, "must be a string")),
    }
}
