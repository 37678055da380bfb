// SPDX-License-Identifier: Apache-2.0

//! Follow-list routes. Every response echoes the full list after the
//! change so clients never need a second read.

use crate::auth::session::SessionIdentity;
use crate::http::support::{
    api_error_response, finish, propagated_request_id, run_store, store_error_response,
};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use ricebook_api::{ApiError, ApiErrorCode, FollowingResponseDto};
use ricebook_model::{UserRecord, Username};
use ricebook_store::{DocumentStore, StoreError};
use serde_json::json;
use std::time::Instant;

fn following_dto(
    store: &DocumentStore,
    user: &UserRecord,
) -> Result<FollowingResponseDto, StoreError> {
    Ok(FollowingResponseDto {
        username: user.username.as_str().to_string(),
        following: store.following_usernames(user)?,
    })
}

/// `GET /following` and `GET /following/:user`.
pub(crate) async fn following_get_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    target: Option<Path<String>>,
) -> Response {
    let route = "/following";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let target_name = match target {
        None => session.username.clone(),
        Some(Path(raw)) => match Username::parse(&raw) {
            Ok(name) => name,
            Err(_) => {
                let resp = api_error_response(
                    StatusCode::NOT_FOUND,
                    ApiError::not_found("user").with_request_id(&request_id),
                );
                return finish(&state, route, started, &request_id, resp).await;
            }
        },
    };

    let fetched = run_store(&state, "following", move |store| {
        let user = store
            .find_user(&target_name)?
            .ok_or(StoreError::NotFound("user"))?;
        following_dto(store, &user)
    })
    .await;
    let resp = match fetched {
        Ok(dto) => (StatusCode::OK, Json(dto)).into_response(),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

/// `PUT /following/:user`. Re-follow is a no-op, so the route stays
/// idempotent.
pub(crate) async fn follow_put_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    Path(raw_target): Path<String>,
) -> Response {
    let route = "/following/:user";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let target = match Username::parse(&raw_target) {
        Ok(name) => name,
        Err(_) => {
            let resp = api_error_response(
                StatusCode::NOT_FOUND,
                ApiError::not_found("user").with_request_id(&request_id),
            );
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    if target == session.username {
        let resp = api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::invalid_field("user", "cannot follow yourself").with_request_id(&request_id),
        );
        return finish(&state, route, started, &request_id, resp).await;
    }

    let caller = session.username.clone();
    let updated = run_store(&state, "follow", move |store| {
        let target_user = store
            .find_user(&target)?
            .ok_or(StoreError::NotFound("user"))?;
        let mut user = store
            .find_user(&caller)?
            .ok_or(StoreError::NotFound("user"))?;
        if user.follow(target_user.id) {
            store.update_user(&user)?;
        }
        following_dto(store, &user)
    })
    .await;
    let resp = match updated {
        Ok(dto) => (StatusCode::OK, Json(dto)).into_response(),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

/// `DELETE /following/:user`. Removing an edge that does not exist is an
/// error, unlike re-follow; clients use it to detect desynced state.
pub(crate) async fn follow_delete_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    Path(raw_target): Path<String>,
) -> Response {
    let route = "/following/:user";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let target = match Username::parse(&raw_target) {
        Ok(name) => name,
        Err(_) => {
            let resp = api_error_response(
                StatusCode::NOT_FOUND,
                ApiError::not_found("user").with_request_id(&request_id),
            );
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let caller = session.username.clone();
    let target_name = target.clone();
    let updated = run_store(&state, "unfollow", move |store| {
        let target_user = store
            .find_user(&target_name)?
            .ok_or(StoreError::NotFound("user"))?;
        let mut user = store
            .find_user(&caller)?
            .ok_or(StoreError::NotFound("user"))?;
        if !user.unfollow(target_user.id) {
            return Ok(None);
        }
        store.update_user(&user)?;
        following_dto(store, &user).map(Some)
    })
    .await;
    let resp = match updated {
        Ok(Some(dto)) => (StatusCode::OK, Json(dto)).into_response(),
        Ok(None) => api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::new(
                ApiErrorCode::NotFollowing,
                "not following that user",
                json!({"user": target.as_str()}),
                &request_id,
            ),
        ),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}
