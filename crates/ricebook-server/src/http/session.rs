// SPDX-License-Identifier: Apache-2.0

//! Credential routes. Registration validates every profile field through
//! the model types before anything is written; login and logout manage
//! the `sid` cookie.

use crate::auth::password::{hash_password, verify_password};
use crate::http::support::{
    api_error_response, clear_session_cookie, client_key, finish, parse_json_body,
    propagated_request_id, required_str_field, run_store, session_cookie, store_error_response,
    with_set_cookie,
};
use crate::middleware::session_guard::session_token_from_headers;
use crate::telemetry::rate_limiter::RateLimitConfig;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ricebook_api::{ApiError, ApiErrorCode, SessionResultDto};
use ricebook_model::{Email, Headline, Phone, Username, Zipcode, DOB_MAX_LEN};
use ricebook_store::NewProfile;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::info;

/// Token-bucket check shared by `/register` and `/login`. Keyed by the
/// forwarded client address so one noisy caller cannot starve the rest.
async fn allow_credential_attempt(state: &AppState, headers: &HeaderMap) -> bool {
    let cfg = RateLimitConfig {
        capacity: state.api.auth_rate_capacity,
        refill_per_sec: state.api.auth_rate_refill_per_sec,
    };
    if state.login_limiter.allow(&client_key(headers), &cfg).await {
        return true;
    }
    state.metrics.record_rate_limited();
    false
}

fn rate_limited_response(request_id: &str) -> Response {
    api_error_response(
        StatusCode::TOO_MANY_REQUESTS,
        ApiError::new(
            ApiErrorCode::RateLimited,
            "too many attempts, slow down",
            json!({}),
            request_id,
        ),
    )
}

#[derive(Debug)]
struct RegistrationInput {
    username: Username,
    password: String,
    profile: NewProfile,
}

/// Checks fields in the order the signup form shows them, so the first
/// error names the first offending input.
fn parse_registration(body: &Value, default_avatar: &str) -> Result<RegistrationInput, ApiError> {
    let username = Username::parse(required_str_field(body, "username")?)
        .map_err(|e| ApiError::invalid_field("username", &e.to_string()))?;
    let email = Email::parse(required_str_field(body, "email")?)
        .map_err(|e| ApiError::invalid_field("email", &e.to_string()))?;
    let dob = required_str_field(body, "dob")?;
    if dob.trim().is_empty() {
        return Err(ApiError::missing_field("dob"));
    }
    if dob.len() > DOB_MAX_LEN {
        return Err(ApiError::invalid_field("dob", "too long"));
    }
    let phone = Phone::parse(required_str_field(body, "phone")?)
        .map_err(|e| ApiError::invalid_field("phone", &e.to_string()))?;
    let zipcode = Zipcode::parse(required_str_field(body, "zipcode")?)
        .map_err(|e| ApiError::invalid_field("zipcode", &e.to_string()))?;
    let password = required_str_field(body, "password")?;
    if password.is_empty() {
        return Err(ApiError::missing_field("password"));
    }
    Ok(RegistrationInput {
        username,
        password: password.to_string(),
        profile: NewProfile {
            email,
            dob: dob.to_string(),
            phone,
            zipcode,
            headline: Headline::default(),
            avatar: default_avatar.to_string(),
        },
    })
}

pub(crate) async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = "/register";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    if !allow_credential_attempt(&state, &headers).await {
        let resp = rate_limited_response(&request_id);
        return finish(&state, route, started, &request_id, resp).await;
    }

    let input = parse_json_body(&body)
        .and_then(|body| parse_registration(&body, &state.api.default_avatar_url));
    let input = match input {
        Ok(input) => input,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let password_hash = match hash_password(&input.password) {
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

    let now = crate::unix_now_ms();
    let created = {
        let username = input.username.clone();
        let profile = input.profile;
        run_store(&state, "create_user", move |store| {
            store.create_user(&username, Some(password_hash), None, profile, now)
        })
        .await
    };
    let resp = match created {
        Ok((user, _)) => {
            info!(username = %user.username, "user registered");
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

pub(crate) async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = "/login";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    if !allow_credential_attempt(&state, &headers).await {
        let resp = rate_limited_response(&request_id);
        return finish(&state, route, started, &request_id, resp).await;
    }

    let body = match parse_json_body(&body) {
        Ok(v) => v,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    let (username_raw, password) = match (
        required_str_field(&body, "username"),
        required_str_field(&body, "password"),
    ) {
        (Ok(u), Ok(p)) => (u.to_string(), p.to_string()),
        (Err(e), _) | (_, Err(e)) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, e.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    // A handle that cannot parse cannot name an account; same answer as
    // an unknown user so probes learn nothing.
    let Ok(username) = Username::parse(&username_raw) else {
        let resp = api_error_response(
            StatusCode::UNAUTHORIZED,
            ApiError::invalid_credentials("user not found").with_request_id(&request_id),
        );
        return finish(&state, route, started, &request_id, resp).await;
    };

    let found = {
        let username = username.clone();
        run_store(&state, "find_user", move |store| store.find_user(&username)).await
    };
    let user = match found {
        Ok(Some(user)) => user,
        Ok(None) => {
            let resp = api_error_response(
                StatusCode::UNAUTHORIZED,
                ApiError::invalid_credentials("user not found").with_request_id(&request_id),
            );
            return finish(&state, route, started, &request_id, resp).await;
        }
        Err(ref err) => {
            let resp = store_error_response(err, &request_id);
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let verified = user
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(&password, hash));
    if !verified {
        let resp = api_error_response(
            StatusCode::UNAUTHORIZED,
            ApiError::invalid_credentials("password mismatch").with_request_id(&request_id),
        );
        return finish(&state, route, started, &request_id, resp).await;
    }

    let resp = match state
        .sessions
        .open_session(&user.username, user.id, crate::unix_now_ms())
        .await
    {
        Ok(token) => {
            info!(username = %user.username, "login");
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

/// `PUT /logout`. Stays outside the guard so a stale cookie gets this
/// handler's 401 envelope; the clearing `Set-Cookie` only rides on a
/// successful teardown.
pub(crate) async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let route = "/logout";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let token = session_token_from_headers(&headers, &state.api.cookie_name);
    let destroyed = match token {
        Some(token) => state.sessions.destroy(&token, crate::unix_now_ms()).await,
        None => false,
    };
    let resp = if destroyed {
        let resp = (StatusCode::OK, Json(json!({"result": "success"}))).into_response();
        with_set_cookie(resp, &clear_session_cookie(&state))
    } else {
        api_error_response(
            StatusCode::UNAUTHORIZED,
            ApiError::not_logged_in().with_request_id(&request_id),
        )
    };
    finish(&state, route, started, &request_id, resp).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVATAR: &str = "https://cdn.ricebook.example/avatars/default.png";

    fn full_body() -> Value {
        json!({
            "username": "newuser",
            "email": "new@rice.edu",
            "dob": "1998-04-12",
            "phone": "713-555-0101",
            "zipcode": "77005",
            "password": "hunter2",
        })
    }

    #[test]
    fn registration_parses_a_full_body() {
        let input = parse_registration(&full_body(), AVATAR).expect("parse");
        assert_eq!(input.username.as_str(), "newuser");
        assert_eq!(input.profile.avatar, AVATAR);
        assert_eq!(input.profile.headline.as_str(), "");
    }

    #[test]
    fn registration_reports_the_first_missing_field_in_form_order() {
        let mut body = full_body();
        body.as_object_mut().unwrap().remove("email");
        body.as_object_mut().unwrap().remove("zipcode");
        let err = parse_registration(&body, AVATAR).unwrap_err();
        assert_eq!(err.message, "email is required");
    }

    #[test]
    fn registration_rejects_bad_profile_values() {
        let mut body = full_body();
        body["phone"] = json!("555-0101");
        let err = parse_registration(&body, AVATAR).unwrap_err();
        assert_eq!(err.code, ApiErrorCode::InvalidFieldValue);

        let mut body = full_body();
        body["password"] = json!("");
        let err = parse_registration(&body, AVATAR).unwrap_err();
        assert_eq!(err.message, "password is required");
    }
}
