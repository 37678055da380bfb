// SPDX-License-Identifier: Apache-2.0

//! Request hygiene caps and the optional audit log. Rejections happen
//! before any handler or body read runs.

use crate::http::support::api_error_response;
use crate::middleware::{normalized_forwarded_for, normalized_header_value};
use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use ricebook_api::{ApiError, ApiErrorCode};
use std::time::Instant;
use tracing::info;

pub(crate) async fn security_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let uri_text = req.uri().to_string();
    if uri_text.len() > state.api.max_uri_bytes {
        state.metrics.record_policy_violation("uri_bytes").await;
        return api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::new(
                ApiErrorCode::QueryRejectedByPolicy,
                "request URI too large",
                serde_json::json!({"max_uri_bytes": state.api.max_uri_bytes, "actual": uri_text.len()}),
                "req-unknown",
            ),
        );
    }
    let header_bytes: usize = req
        .headers()
        .iter()
        .map(|(k, v)| k.as_str().len() + v.as_bytes().len())
        .sum();
    if header_bytes > state.api.max_header_bytes {
        state.metrics.record_policy_violation("header_bytes").await;
        return api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::new(
                ApiErrorCode::QueryRejectedByPolicy,
                "request headers too large",
                serde_json::json!({"max_header_bytes": state.api.max_header_bytes, "actual": header_bytes}),
                "req-unknown",
            ),
        );
    }

    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id =
        normalized_header_value(req.headers(), "x-request-id", 128).unwrap_or_default();
    let client_ip =
        normalized_forwarded_for(req.headers()).unwrap_or_else(|| "unknown".to_string());
    let resp = next.run(req).await;
    if state.api.enable_audit_log {
        info!(
            target: "ricebook_audit",
            method = %method,
            path = %path,
            status = resp.status().as_u16(),
            request_id = %request_id,
            client_ip = %client_ip,
            latency_ms = started.elapsed().as_millis() as u64,
            "audit"
        );
    }
    resp
}
