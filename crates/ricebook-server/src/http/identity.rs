// SPDX-License-Identifier: Apache-2.0

//! Third-party identity routes: Google sign-in/sign-up plus linking and
//! unlinking against an existing account.

use crate::auth::google::{derive_unique_username, parse_assertion, AssertionError};
use crate::auth::session::SessionIdentity;
use crate::http::support::{
    api_error_response, clear_session_cookie, finish, parse_json_body, propagated_request_id,
    required_str_field, run_store, session_cookie, store_error_response, with_set_cookie,
};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use ricebook_api::{ApiError, ApiErrorCode, SessionResultDto};
use ricebook_model::{Email, GoogleIdentity, Headline, ParseError, Phone, Zipcode};
use ricebook_store::{NewProfile, StoreError};
use serde_json::json;
use std::time::Instant;
use tracing::info;

fn assertion_error_response(err: AssertionError, request_id: &str) -> Response {
    let api_err = match err {
        AssertionError::Missing(field) => ApiError::missing_field(field),
        AssertionError::Invalid(field) => ApiError::invalid_field(field, "malformed"),
    };
    api_error_response(StatusCode::BAD_REQUEST, api_err.with_request_id(request_id))
}

/// Profile seed for accounts born from a Google assertion. The provider
/// never supplies dob, phone or zipcode, so those hold placeholders.
fn placeholder_profile(
    identity: &GoogleIdentity,
    default_avatar: &str,
) -> Result<NewProfile, ParseError> {
    let email = match identity.email.as_deref().and_then(|raw| Email::parse(raw).ok()) {
        Some(email) => email,
        // Uid chars are [A-Za-z0-9_-], so this always parses.
        None => Email::parse(&format!("{}@ricebook.local", identity.uid.as_str()))?,
    };
    let avatar = identity
        .photo_url
        .clone()
        .unwrap_or_else(|| default_avatar.to_string());
    Ok(NewProfile {
        email,
        dob: "1970-01-01".to_string(),
        phone: Phone::parse("000-000-0000")?,
        zipcode: Zipcode::parse("00000")?,
        headline: Headline::default(),
        avatar,
    })
}

/// `POST /auth/googleRegister`. Sign-in when the uid is known, otherwise
/// a fresh account with a derived handle; both end with a live session.
pub(crate) async fn google_register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = "/auth/googleRegister";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let body = match parse_json_body(&body) {
        Ok(v) => v,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    let identity = match parse_assertion(&body) {
        Ok(identity) => identity,
        Err(err) => {
            let resp = assertion_error_response(err, &request_id);
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    let profile = match placeholder_profile(&identity, &state.api.default_avatar_url) {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(error = %e, "placeholder profile rejected");
            let resp = api_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal().with_request_id(&request_id),
            );
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let now = crate::unix_now_ms();
    let signed_in = run_store(&state, "google_register", move |store| {
        if let Some(user) = store.find_user_by_google_uid(&identity.uid)? {
            return Ok((user, false));
        }
        let username = derive_unique_username(store, &identity)?;
        let (user, _) = store.create_user(&username, None, Some(identity), profile, now)?;
        Ok((user, true))
    })
    .await;
    let (user, created) = match signed_in {
        Ok(pair) => pair,
        Err(ref err) => {
            let resp = store_error_response(err, &request_id);
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let resp = match state
        .sessions
        .open_session(&user.username, user.id, crate::unix_now_ms())
        .await
    {
        Ok(token) => {
            if created {
                info!(username = %user.username, "google account created");
            } else {
                info!(username = %user.username, "google sign-in");
            }
            let cookie = session_cookie(&state, &token, state.sessions.ttl().as_secs());
            let resp = (
                StatusCode::OK,
                Json(SessionResultDto::success(user.username.as_str())),
            )
                .into_response();
            with_set_cookie(resp, &cookie)
        }
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

/// `POST /linkThirdPartyUser`. Attaches the asserted identity to the
/// caller's account. Re-posting the caller's own uid is a no-op success;
/// a uid held by someone else is a conflict.
pub(crate) async fn link_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = "/linkThirdPartyUser";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let body = match parse_json_body(&body) {
        Ok(v) => v,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    let identity = match parse_assertion(&body) {
        Ok(identity) => identity,
        Err(err) => {
            let resp = assertion_error_response(err, &request_id);
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let caller = session.username.clone();
    let linked = run_store(&state, "google_link", move |store| {
        if let Some(holder) = store.find_user_by_google_uid(&identity.uid)? {
            if holder.username != caller {
                return Err(StoreError::Conflict("google identity"));
            }
            return Ok(holder);
        }
        let mut user = store
            .find_user(&caller)?
            .ok_or(StoreError::NotFound("user"))?;
        user.google = Some(identity);
        store.update_user(&user)?;
        Ok(user)
    })
    .await;

    let resp = match linked {
        Ok(user) => {
            info!(username = %user.username, "google account linked");
            (
                StatusCode::OK,
                Json(SessionResultDto::success(user.username.as_str())),
            )
                .into_response()
        }
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

enum UnlinkOutcome {
    NoIdentity,
    Unlinked,
    Deleted,
}

/// `DELETE /unlinkThirdPartyUser`. With a password on file only the link
/// goes; a Google-only account is removed outright, sessions included.
pub(crate) async fn unlink_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = "/unlinkThirdPartyUser";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let body = match parse_json_body(&body) {
        Ok(v) => v,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    let claimed = match required_str_field(&body, "username") {
        Ok(v) => v.to_string(),
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    if claimed != session.username.as_str() {
        let resp = api_error_response(
            StatusCode::FORBIDDEN,
            ApiError::forbidden().with_request_id(&request_id),
        );
        return finish(&state, route, started, &request_id, resp).await;
    }

    let caller = session.username.clone();
    let outcome = run_store(&state, "google_unlink", move |store| {
        let mut user = store
            .find_user(&caller)?
            .ok_or(StoreError::NotFound("user"))?;
        if user.google.is_none() {
            return Ok(UnlinkOutcome::NoIdentity);
        }
        if user.password_hash.is_some() {
            user.google = None;
            store.update_user(&user)?;
            return Ok(UnlinkOutcome::Unlinked);
        }
        store.delete_user(&user)?;
        Ok(UnlinkOutcome::Deleted)
    })
    .await;

    let resp = match outcome {
        Ok(UnlinkOutcome::NoIdentity) => api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::new(
                ApiErrorCode::NoLinkedIdentity,
                "no google account linked",
                json!({}),
                &request_id,
            ),
        ),
        Ok(UnlinkOutcome::Unlinked) => {
            info!(username = %session.username, "google account unlinked");
            (
                StatusCode::OK,
                Json(json!({
                    "username": session.username.as_str(),
                    "result": "google account unlinked",
                })),
            )
                .into_response()
        }
        Ok(UnlinkOutcome::Deleted) => {
            // The store row purge happened in the delete transaction; this
            // clears the in-process and redis session caches.
            state.sessions.destroy_all_for(&session.username).await;
            info!(username = %session.username, "google-only account deleted");
            let resp = (
                StatusCode::OK,
                Json(json!({
                    "username": session.username.as_str(),
                    "result": "user and profile deleted",
                })),
            )
                .into_response();
            with_set_cookie(resp, &clear_session_cookie(&state))
        }
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}
