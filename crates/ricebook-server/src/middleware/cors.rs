// SPDX-License-Identifier: Apache-2.0

//! Credentialed CORS for the SPA. The session cookie only travels
//! cross-origin when the exact origin is allow-listed and the response
//! carries `access-control-allow-credentials`, so the wildcard origin is
//! never an option here.

use crate::middleware::normalized_header_value;
use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

fn origin_allowed(state: &AppState, origin: &str) -> bool {
    state.api.cors_allowed_origins.iter().any(|x| x == origin)
}

fn apply_cors_headers(resp: &mut Response, origin: &str) {
    if let Ok(v) = HeaderValue::from_str(origin) {
        resp.headers_mut().insert("access-control-allow-origin", v);
    }
    resp.headers_mut().insert(
        "access-control-allow-credentials",
        HeaderValue::from_static("true"),
    );
    resp.headers_mut()
        .insert("vary", HeaderValue::from_static("Origin"));
}

pub(crate) async fn cors_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = normalized_header_value(req.headers(), "origin", 256);
    let method = req.method().clone();
    if method == axum::http::Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        if let Some(origin_value) = origin {
            if origin_allowed(&state, &origin_value) {
                apply_cors_headers(&mut resp, &origin_value);
                resp.headers_mut().insert(
                    "access-control-allow-methods",
                    HeaderValue::from_static("GET,POST,PUT,DELETE,OPTIONS"),
                );
                resp.headers_mut().insert(
                    "access-control-allow-headers",
                    HeaderValue::from_static("content-type"),
                );
            }
        }
        return resp;
    }

    let mut resp = next.run(req).await;
    if let Some(origin_value) = origin {
        if origin_allowed(&state, &origin_value) {
            apply_cors_headers(&mut resp, &origin_value);
        }
    }
    resp
}
