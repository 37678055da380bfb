// SPDX-License-Identifier: Apache-2.0

//! Session enforcement for every route that is not in the open set.
//! Authenticated requests carry their `SessionIdentity` into the handler
//! through request extensions.

use crate::http::support::{api_error_response, propagated_request_id, with_request_id};
use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use ricebook_api::ApiError;

/// Routes a caller may hit without a live session. `/logout` stays open so
/// the handler can answer 401 with its own cookie-clearing shape, and media
/// reads stay open so `<img>` tags work before login.
fn open_route(method: &Method, path: &str) -> bool {
    if method == Method::GET && path.starts_with("/media/") {
        return true;
    }
    matches!(
        path,
        "/" | "/login"
            | "/register"
            | "/logout"
            | "/auth/googleRegister"
            | "/healthz"
            | "/readyz"
            | "/version"
            | "/metrics"
    )
}

pub(crate) fn session_token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get("cookie")?.to_str().ok()?;
    for pair in raw.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else {
            continue;
        };
        if name == cookie_name {
            let token = value.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    None
}

pub(crate) async fn session_guard_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if open_route(req.method(), req.uri().path()) {
        return next.run(req).await;
    }
    let identity = match session_token_from_headers(req.headers(), &state.api.cookie_name) {
        Some(token) => state.sessions.authenticate(&token, crate::unix_now_ms()).await,
        None => None,
    };
    match identity {
        Some(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        None => {
            let request_id = propagated_request_id(req.headers(), &state);
            let resp = api_error_response(
                StatusCode::UNAUTHORIZED,
                ApiError::not_logged_in().with_request_id(&request_id),
            );
            with_request_id(resp, &request_id)
        }
    }
}
