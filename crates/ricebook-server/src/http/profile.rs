// SPDX-License-Identifier: Apache-2.0

//! Profile field routes. Reads and writes share one generic core; the
//! per-field handlers exist only to bind paths. `dob` has no writer and
//! `avatar` additionally accepts a multipart upload.

use crate::auth::password::hash_password;
use crate::auth::session::SessionIdentity;
use crate::http::media::store_image_field;
use crate::http::support::{
    api_error_response, finish, parse_json_body, propagated_request_id, required_str_field,
    run_store, store_error_response,
};
use crate::middleware::session_guard::session_token_from_headers;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use ricebook_api::{profile_field_response, ApiError, ApiErrorCode};
use ricebook_model::{
    Email, Headline, Phone, ProfileDoc, Username, Zipcode, AVATAR_URL_MAX_LEN,
};
use ricebook_store::StoreError;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::info;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ProfileField {
    Email,
    Zipcode,
    Phone,
    Dob,
    Headline,
    Avatar,
}

impl ProfileField {
    fn name(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Zipcode => "zipcode",
            Self::Phone => "phone",
            Self::Dob => "dob",
            Self::Headline => "headline",
            Self::Avatar => "avatar",
        }
    }

    fn route(self) -> &'static str {
        match self {
            Self::Email => "/email",
            Self::Zipcode => "/zipcode",
            Self::Phone => "/phone",
            Self::Dob => "/dob",
            Self::Headline => "/headline",
            Self::Avatar => "/avatar",
        }
    }

    fn value(self, profile: &ProfileDoc) -> Value {
        match self {
            Self::Email => json!(profile.email.as_str()),
            Self::Zipcode => json!(profile.zipcode.as_str()),
            Self::Phone => json!(profile.phone.as_str()),
            Self::Dob => json!(profile.dob),
            Self::Headline => json!(profile.headline.as_str()),
            Self::Avatar => json!(profile.avatar),
        }
    }
}

enum FieldUpdate {
    Email(Email),
    Zipcode(Zipcode),
    Phone(Phone),
    Headline(Headline),
    Avatar(String),
}

impl FieldUpdate {
    fn parse(field: ProfileField, raw: &str) -> Result<Self, ApiError> {
        match field {
            ProfileField::Email => Email::parse(raw)
                .map(Self::Email)
                .map_err(|e| ApiError::invalid_field("email", &e.to_string())),
            ProfileField::Zipcode => Zipcode::parse(raw)
                .map(Self::Zipcode)
                .map_err(|e| ApiError::invalid_field("zipcode", &e.to_string())),
            ProfileField::Phone => Phone::parse(raw)
                .map(Self::Phone)
                .map_err(|e| ApiError::invalid_field("phone", &e.to_string())),
            ProfileField::Headline => Headline::parse(raw)
                .map(Self::Headline)
                .map_err(|e| ApiError::invalid_field("headline", &e.to_string())),
            ProfileField::Avatar => parse_avatar_url(raw).map(Self::Avatar),
            ProfileField::Dob => Err(ApiError::invalid_field("dob", "read only")),
        }
    }

    fn apply(self, profile: &mut ProfileDoc) {
        match self {
            Self::Email(v) => profile.email = v,
            Self::Zipcode(v) => profile.zipcode = v,
            Self::Phone(v) => profile.phone = v,
            Self::Headline(v) => profile.headline = v,
            Self::Avatar(v) => profile.avatar = v,
        }
    }
}

fn parse_avatar_url(raw: &str) -> Result<String, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::missing_field("avatar"));
    }
    if raw.len() > AVATAR_URL_MAX_LEN {
        return Err(ApiError::invalid_field("avatar", "too long"));
    }
    Ok(raw.to_string())
}

/// Reads one profile field, for the caller or for `:user`. Unknown and
/// unparseable handles both answer 404; the route does not reveal which.
async fn profile_field_get(
    state: AppState,
    session: SessionIdentity,
    headers: HeaderMap,
    target: Option<Path<String>>,
    field: ProfileField,
) -> Response {
    let route = field.route();
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

    let fetched = run_store(&state, "profile", move |store| store.profile(&target_name)).await;
    let resp = match fetched {
        Ok(Some(profile)) => (
            StatusCode::OK,
            Json(profile_field_response(
                profile.username.as_str(),
                field.name(),
                &field.value(&profile),
            )),
        )
            .into_response(),
        Ok(None) => api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found("user").with_request_id(&request_id),
        ),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

/// Writes one profile field on the caller's own profile and echoes the
/// stored value.
async fn profile_field_put(
    state: AppState,
    session: SessionIdentity,
    headers: HeaderMap,
    body: Bytes,
    field: ProfileField,
) -> Response {
    let route = field.route();
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let update = parse_json_body(&body)
        .and_then(|body| FieldUpdate::parse(field, required_str_field(&body, field.name())?));
    let update = match update {
        Ok(update) => update,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let caller = session.username.clone();
    let written = run_store(&state, "update_profile", move |store| {
        let mut profile = store
            .profile(&caller)?
            .ok_or(StoreError::NotFound("user"))?;
        update.apply(&mut profile);
        store.update_profile(&profile)?;
        Ok(profile)
    })
    .await;
    let resp = match written {
        Ok(profile) => (
            StatusCode::OK,
            Json(profile_field_response(
                profile.username.as_str(),
                field.name(),
                &field.value(&profile),
            )),
        )
            .into_response(),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

pub(crate) async fn email_get_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    target: Option<Path<String>>,
) -> Response {
    profile_field_get(state, session, headers, target, ProfileField::Email).await
}

pub(crate) async fn zipcode_get_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    target: Option<Path<String>>,
) -> Response {
    profile_field_get(state, session, headers, target, ProfileField::Zipcode).await
}

pub(crate) async fn phone_get_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    target: Option<Path<String>>,
) -> Response {
    profile_field_get(state, session, headers, target, ProfileField::Phone).await
}

pub(crate) async fn dob_get_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    target: Option<Path<String>>,
) -> Response {
    profile_field_get(state, session, headers, target, ProfileField::Dob).await
}

pub(crate) async fn headline_get_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    target: Option<Path<String>>,
) -> Response {
    profile_field_get(state, session, headers, target, ProfileField::Headline).await
}

pub(crate) async fn avatar_get_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    target: Option<Path<String>>,
) -> Response {
    profile_field_get(state, session, headers, target, ProfileField::Avatar).await
}

pub(crate) async fn email_put_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    profile_field_put(state, session, headers, body, ProfileField::Email).await
}

pub(crate) async fn zipcode_put_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    profile_field_put(state, session, headers, body, ProfileField::Zipcode).await
}

pub(crate) async fn phone_put_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    profile_field_put(state, session, headers, body, ProfileField::Phone).await
}

pub(crate) async fn headline_put_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    profile_field_put(state, session, headers, body, ProfileField::Headline).await
}

/// `PUT /avatar`. Multipart uploads the image itself (field `avatar`);
/// JSON sets an already-hosted URL.
pub(crate) async fn avatar_put_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    req: Request,
) -> Response {
    let route = "/avatar";
    let started = Instant::now();
    let request_id = propagated_request_id(req.headers(), &state);

    let is_multipart = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let url = if is_multipart {
        match read_avatar_upload(&state, req).await {
            Ok(url) => url,
            Err((status, err)) => {
                let resp = api_error_response(status, err.with_request_id(&request_id));
                return finish(&state, route, started, &request_id, resp).await;
            }
        }
    } else {
        let bytes = match Bytes::from_request(req, &state).await {
            Ok(bytes) => bytes,
            Err(_) => {
                let resp = api_error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ApiError::new(
                        ApiErrorCode::PayloadTooLarge,
                        "request body too large",
                        json!({"max_body_bytes": state.api.max_upload_bytes}),
                        &request_id,
                    ),
                );
                return finish(&state, route, started, &request_id, resp).await;
            }
        };
        let parsed = parse_json_body(&bytes)
            .and_then(|body| parse_avatar_url(required_str_field(&body, "avatar")?));
        match parsed {
            Ok(url) => url,
            Err(err) => {
                let resp =
                    api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
                return finish(&state, route, started, &request_id, resp).await;
            }
        }
    };

    let caller = session.username.clone();
    let written = run_store(&state, "update_profile", move |store| {
        let mut profile = store
            .profile(&caller)?
            .ok_or(StoreError::NotFound("user"))?;
        profile.avatar = url;
        store.update_profile(&profile)?;
        Ok(profile)
    })
    .await;
    let resp = match written {
        Ok(profile) => (
            StatusCode::OK,
            Json(profile_field_response(
                profile.username.as_str(),
                "avatar",
                &json!(profile.avatar),
            )),
        )
            .into_response(),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

async fn read_avatar_upload(
    state: &AppState,
    req: Request,
) -> Result<String, (StatusCode, ApiError)> {
    let malformed = |detail: String| {
        (
            StatusCode::BAD_REQUEST,
            ApiError::new(
                ApiErrorCode::InvalidRequestBody,
                "malformed multipart body",
                json!({"parse_error": detail}),
                "req-unknown",
            ),
        )
    };
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| malformed(e.to_string()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed(e.to_string()))?
    {
        if field.name() == Some("avatar") {
            return Ok(store_image_field(state, field).await?.url);
        }
    }
    Err((
        StatusCode::BAD_REQUEST,
        ApiError::missing_field("avatar"),
    ))
}

/// `PUT /password`. Re-hashes, then revokes every other session the
/// account holds; the session that made the change stays live.
pub(crate) async fn password_put_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = "/password";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let password = match parse_json_body(&body).and_then(|body| {
        let raw = required_str_field(&body, "password")?;
        if raw.is_empty() {
            return Err(ApiError::missing_field("password"));
        }
        Ok(raw.to_string())
    }) {
        Ok(p) => p,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let password_hash = match hash_password(&password) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "password hashing failed");
            let resp = api_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal().with_request_id(&request_id),
            );
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let caller = session.username.clone();
    let updated = run_store(&state, "update_password", move |store| {
        let mut user = store
            .find_user(&caller)?
            .ok_or(StoreError::NotFound("user"))?;
        user.password_hash = Some(password_hash);
        store.update_user(&user)
    })
    .await;
    let resp = match updated {
        Ok(()) => {
            let revoked = match session_token_from_headers(&headers, &state.api.cookie_name) {
                Some(token) => {
                    state
                        .sessions
                        .destroy_others(&session.username, &token, crate::unix_now_ms())
                        .await
                }
                None => state.sessions.destroy_all_for(&session.username).await,
            };
            info!(username = %session.username, revoked, "password updated");
            (
                StatusCode::OK,
                Json(json!({
                    "username": session.username.as_str(),
                    "result": "password updated",
                })),
            )
                .into_response()
        }
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}
