// SPDX-License-Identifier: Apache-2.0

//! Serving stored media plus the shared validation for incoming image
//! parts (article images and avatar uploads take the same checks).

use crate::http::support::{api_error_response, finish, propagated_request_id};
use crate::media::{valid_media_id, StoredMedia};
use crate::AppState;
use axum::extract::multipart::Field;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ricebook_api::{ApiError, ApiErrorCode};
use serde_json::json;
use std::time::Instant;

/// Validates one multipart image field and writes it to the media store.
/// The declared content type must be `image/*` and the payload must fit
/// the configured image cap.
pub(crate) async fn store_image_field(
    state: &AppState,
    field: Field<'_>,
) -> Result<StoredMedia, (StatusCode, ApiError)> {
    let content_type = field.content_type().unwrap_or("").to_string();
    if !content_type.starts_with("image/") {
        return Err((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::new(
                ApiErrorCode::UnsupportedMediaType,
                "uploaded file must be an image",
                json!({"content_type": content_type}),
                "req-unknown",
            ),
        ));
    }
    let bytes = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            ApiError::new(
                ApiErrorCode::InvalidRequestBody,
                "malformed multipart body",
                json!({"parse_error": e.to_string()}),
                "req-unknown",
            ),
        )
    })?;
    if bytes.len() > state.api.max_image_bytes {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::new(
                ApiErrorCode::PayloadTooLarge,
                "image too large",
                json!({
                    "max_image_bytes": state.api.max_image_bytes,
                    "actual": bytes.len(),
                }),
                "req-unknown",
            ),
        ));
    }
    state
        .media
        .put_object(&content_type, bytes.to_vec())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "media store write failed");
            (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal())
        })
}

/// `GET /media/:id`. Ids are content-addressed, so successful answers are
/// immutable and cached hard.
pub(crate) async fn media_fetch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(media_id): Path<String>,
) -> Response {
    let route = "/media/:id";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    if !valid_media_id(&media_id) {
        let resp = api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found("media").with_request_id(&request_id),
        );
        return finish(&state, route, started, &request_id, resp).await;
    }
    let resp = match state.media.fetch_object(&media_id).await {
        Ok((content_type, bytes)) => {
            let mut resp = (StatusCode::OK, bytes).into_response();
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                resp.headers_mut().insert("content-type", value);
            }
            resp.headers_mut().insert(
                "cache-control",
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            );
            resp
        }
        Err(_) => api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::not_found("media").with_request_id(&request_id),
        ),
    };
    finish(&state, route, started, &request_id, resp).await
}
