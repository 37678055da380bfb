// SPDX-License-Identifier: Apache-2.0

use crate::errors::ApiError;
use ricebook_model::{ArticleId, CommentId, Username};
use std::collections::BTreeMap;

pub const DEFAULT_FEED_LIMIT: usize = 50;
pub const MAX_FEED_LIMIT: usize = 200;

/// How `GET /articles/:id?` dispatches: no segment is the caller's feed,
/// an all-digit segment is one article, anything else is an author handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleSelector {
    Feed,
    ById(ArticleId),
    ByAuthor(Username),
}

impl ArticleSelector {
    pub fn classify(segment: Option<&str>) -> Result<Self, ApiError> {
        let Some(raw) = segment else {
            return Ok(Self::Feed);
        };
        if raw.is_empty() {
            return Ok(Self::Feed);
        }
        if raw.chars().all(|c| c.is_ascii_digit()) {
            return ArticleId::parse(raw)
                .map(Self::ById)
                .map_err(|e| ApiError::invalid_field("id", &e.to_string()));
        }
        Username::parse(raw)
            .map(Self::ByAuthor)
            .map_err(|e| ApiError::invalid_field("id", &e.to_string()))
    }
}

/// The `commentId` discriminator in `PUT /articles/:id`: absent edits the
/// article text, `-1` appends a comment, anything else edits that comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentTarget {
    ArticleText,
    NewComment,
    Existing(CommentId),
}

impl CommentTarget {
    pub fn classify(comment_id: Option<i64>) -> Result<Self, ApiError> {
        match comment_id {
            None => Ok(Self::ArticleText),
            Some(-1) => Ok(Self::NewComment),
            Some(n) if n >= 0 => Ok(Self::Existing(CommentId::from_u64(n as u64))),
            Some(n) => Err(ApiError::invalid_field(
                "commentId",
                &format!("{n} is not a comment id"),
            )),
        }
    }
}

pub fn parse_feed_limit(query: &BTreeMap<String, String>) -> Result<usize, ApiError> {
    let Some(raw) = query.get("limit") else {
        return Ok(DEFAULT_FEED_LIMIT);
    };
    let value = raw
        .parse::<usize>()
        .map_err(|_| ApiError::invalid_field("limit", raw))?;
    if value == 0 || value > MAX_FEED_LIMIT {
        return Err(ApiError::invalid_field("limit", raw));
    }
    Ok(value)
}
