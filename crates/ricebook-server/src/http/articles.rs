// SPDX-License-Identifier: Apache-2.0

//! Article routes: create (JSON or multipart with an image), the feed and
//! targeted reads, text and comment edits, and the comment-author lookup.

use crate::auth::session::SessionIdentity;
use crate::http::media::store_image_field;
use crate::http::support::{
    api_error_response, finish, parse_json_body, propagated_request_id, optional_str_field,
    run_store, store_error_response,
};
use crate::media::StoredMedia;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use ricebook_api::{
    parse_feed_limit, ApiError, ApiErrorCode, ArticleSelector, ArticlesResponseDto,
    CommentAuthorDto, CommentTarget,
};
use ricebook_model::{
    ArticleDoc, ArticleId, CommentId, ARTICLE_TEXT_MAX_LEN, COMMENT_BODY_MAX_LEN,
};
use ricebook_store::StoreError;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

/// Drains a `multipart/form-data` upload: the `text` part plus an optional
/// `image` part, which is validated and written to the media store.
async fn read_article_upload(
    state: &AppState,
    req: Request,
) -> Result<(Option<String>, Option<StoredMedia>), (StatusCode, ApiError)> {
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
    let mut text = None;
    let mut stored = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed(e.to_string()))?
    {
        match field.name() {
            Some("text") => {
                text = Some(field.text().await.map_err(|e| malformed(e.to_string()))?);
            }
            Some("image") => {
                stored = Some(store_image_field(state, field).await?);
            }
            _ => {}
        }
    }
    Ok((text, stored))
}

/// `POST /article`. JSON carries text only; multipart may add an image,
/// whose stored URL lands on the new article.
pub(crate) async fn create_article_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    req: Request,
) -> Response {
    let route = "/article";
    let started = Instant::now();
    let request_id = propagated_request_id(req.headers(), &state);

    let is_multipart = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (text, image) = if is_multipart {
        match read_article_upload(&state, req).await {
            Ok(pair) => pair,
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
            .and_then(|body| Ok(optional_str_field(&body, "text")?.map(str::to_string)));
        match parsed {
            Ok(text) => (text, None),
            Err(err) => {
                let resp =
                    api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
                return finish(&state, route, started, &request_id, resp).await;
            }
        }
    };

    let text = match text {
        Some(text) if !text.is_empty() => text,
        _ => {
            let resp = api_error_response(
                StatusCode::BAD_REQUEST,
                ApiError::missing_field("text").with_request_id(&request_id),
            );
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    if text.len() > ARTICLE_TEXT_MAX_LEN {
        let resp = api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::invalid_field("text", "too long").with_request_id(&request_id),
        );
        return finish(&state, route, started, &request_id, resp).await;
    }

    let author = session.username.clone();
    let image_url = image.map(|m| m.url);
    let now = crate::unix_now_ms();
    let created = run_store(&state, "create_article", move |store| {
        store.create_article(&author, text, image_url, now)
    })
    .await;
    let resp = match created {
        Ok(article) => {
            info!(article_id = %article.id, author = %article.author, "article created");
            (
                StatusCode::CREATED,
                Json(ArticlesResponseDto::single(article)),
            )
                .into_response()
        }
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

/// `GET /articles` and `GET /articles/:id`. No segment is the caller's
/// feed; digits select one article; a handle selects that author's posts.
pub(crate) async fn get_articles_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    segment: Option<Path<String>>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let route = "/articles";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let limit = match parse_feed_limit(&query) {
        Ok(limit) => limit,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    let segment = segment.map(|Path(s)| s);
    let selector = match ArticleSelector::classify(segment.as_deref()) {
        Ok(selector) => selector,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let fetched = match selector {
        ArticleSelector::Feed => {
            let caller = session.username.clone();
            run_store(&state, "feed", move |store| {
                let user = store
                    .find_user(&caller)?
                    .ok_or(StoreError::NotFound("user"))?;
                let mut authors = store.following_usernames(&user)?;
                authors.push(caller.as_str().to_string());
                let refs: Vec<&str> = authors.iter().map(String::as_str).collect();
                store.articles_by_authors(&refs, limit)
            })
            .await
        }
        ArticleSelector::ById(id) => run_store(&state, "article_by_id", move |store| {
            Ok(store.article(id)?.into_iter().collect())
        })
        .await,
        ArticleSelector::ByAuthor(author) => {
            run_store(&state, "articles_by_author", move |store| {
                store.articles_by_author(&author, limit)
            })
            .await
        }
    };

    let resp = match fetched {
        Ok(articles) => (StatusCode::OK, Json(ArticlesResponseDto::new(articles))).into_response(),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

enum ArticleUpdate {
    Updated(ArticleDoc),
    NotOwner,
}

fn comment_id_field(body: &Value) -> Result<Option<i64>, ApiError> {
    match body.get("commentId") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ApiError::invalid_field("commentId", "must be an integer")),
        Some(_) => Err(ApiError::invalid_field("commentId", "must be an integer")),
    }
}

/// `PUT /articles/:id`. Without `commentId` this edits the article text
/// (author only). `commentId: -1` appends a comment from the caller; any
/// other id edits that comment (comment author only).
pub(crate) async fn update_article_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionIdentity>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Response {
    let route = "/articles/:id";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let id = match ArticleId::parse(&raw_id) {
        Ok(id) => id,
        Err(e) => {
            let resp = api_error_response(
                StatusCode::BAD_REQUEST,
                ApiError::invalid_field("id", &e.to_string()).with_request_id(&request_id),
            );
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    let body = match parse_json_body(&body) {
        Ok(v) => v,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };
    let parsed = comment_id_field(&body).and_then(|raw| {
        let target = CommentTarget::classify(raw)?;
        let text = match body.get("text") {
            None | Some(Value::Null) => return Err(ApiError::missing_field("text")),
            Some(Value::String(s)) if s.is_empty() => return Err(ApiError::missing_field("text")),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ApiError::invalid_field("text", "must be a string")),
        };
        let cap = match target {
            CommentTarget::ArticleText => ARTICLE_TEXT_MAX_LEN,
            CommentTarget::NewComment | CommentTarget::Existing(_) => COMMENT_BODY_MAX_LEN,
        };
        if text.len() > cap {
            return Err(ApiError::invalid_field("text", "too long"));
        }
        let avatar = optional_str_field(&body, "avatar")?.map(str::to_string);
        Ok((target, text, avatar))
    });
    let (target, text, avatar) = match parsed {
        Ok(triple) => triple,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let caller = session.username.clone();
    let now = crate::unix_now_ms();
    let updated = match target {
        CommentTarget::ArticleText => {
            run_store(&state, "edit_article", move |store| {
                let article = store.article(id)?.ok_or(StoreError::NotFound("article"))?;
                if article.author != caller {
                    return Ok(ArticleUpdate::NotOwner);
                }
                store.edit_article_text(id, text).map(ArticleUpdate::Updated)
            })
            .await
        }
        CommentTarget::NewComment => {
            run_store(&state, "append_comment", move |store| {
                store
                    .append_comment(id, &caller, text, avatar, now)
                    .map(ArticleUpdate::Updated)
            })
            .await
        }
        CommentTarget::Existing(comment_id) => {
            run_store(&state, "edit_comment", move |store| {
                let article = store.article(id)?.ok_or(StoreError::NotFound("article"))?;
                let comment = article
                    .comment(comment_id)
                    .ok_or(StoreError::NotFound("comment"))?;
                if comment.author != caller {
                    return Ok(ArticleUpdate::NotOwner);
                }
                store
                    .edit_comment_body(id, comment_id, text)
                    .map(ArticleUpdate::Updated)
            })
            .await
        }
    };

    let resp = match updated {
        Ok(ArticleUpdate::Updated(article)) => {
            (StatusCode::OK, Json(ArticlesResponseDto::single(article))).into_response()
        }
        Ok(ArticleUpdate::NotOwner) => api_error_response(
            StatusCode::FORBIDDEN,
            ApiError::forbidden().with_request_id(&request_id),
        ),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

/// `GET /getCommentAuthor/:articleId/:commentId`. Prefers the author's
/// current profile avatar over the snapshot taken when the comment was
/// written; authors whose accounts are gone fall back to the snapshot.
pub(crate) async fn comment_author_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((raw_article, raw_comment)): Path<(String, String)>,
) -> Response {
    let route = "/getCommentAuthor";
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);

    let ids = ArticleId::parse(&raw_article)
        .map_err(|e| ApiError::invalid_field("articleId", &e.to_string()))
        .and_then(|article_id| {
            CommentId::parse(&raw_comment)
                .map(|comment_id| (article_id, comment_id))
                .map_err(|e| ApiError::invalid_field("commentId", &e.to_string()))
        });
    let (article_id, comment_id) = match ids {
        Ok(pair) => pair,
        Err(err) => {
            let resp = api_error_response(StatusCode::BAD_REQUEST, err.with_request_id(&request_id));
            return finish(&state, route, started, &request_id, resp).await;
        }
    };

    let looked_up = run_store(&state, "comment_author", move |store| {
        let article = store
            .article(article_id)?
            .ok_or(StoreError::NotFound("article"))?;
        let comment = article
            .comment(comment_id)
            .ok_or(StoreError::NotFound("comment"))?;
        let author = comment.author.clone();
        let avatar = match store.profile(&author)? {
            Some(profile) if !profile.avatar.is_empty() => Some(profile.avatar),
            _ => comment.avatar.clone(),
        };
        Ok((author, avatar))
    })
    .await;

    let resp = match looked_up {
        Ok((author, avatar)) => (
            StatusCode::OK,
            Json(CommentAuthorDto {
                username: author.as_str().to_string(),
                avatar,
            }),
        )
            .into_response(),
        Err(ref err) => store_error_response(err, &request_id),
    };
    finish(&state, route, started, &request_id, resp).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_id_field_shapes() {
        assert_eq!(comment_id_field(&json!({})).unwrap(), None);
        assert_eq!(comment_id_field(&json!({"commentId": null})).unwrap(), None);
        assert_eq!(
            comment_id_field(&json!({"commentId": -1})).unwrap(),
            Some(-1)
        );
        assert_eq!(comment_id_field(&json!({"commentId": 7})).unwrap(), Some(7));
        assert!(comment_id_field(&json!({"commentId": "7"})).is_err());
        assert!(comment_id_field(&json!({"commentId": 1.5})).is_err());
    }
}
