// SPDX-License-Identifier: Apache-2.0

use ricebook_model::ArticleDoc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// `POST /login`, `POST /register` and the third-party routes all answer
/// with this shape; the SPA dispatches its auth reducer on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionResultDto {
    pub username: String,
    pub result: String,
}

impl SessionResultDto {
    #[must_use]
    pub fn success(username: &str) -> Self {
        Self {
            username: username.to_string(),
            result: "success".to_string(),
        }
    }
}

/// Every article read and the create path answer `{"articles": [...]}`,
/// even for a single article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticlesResponseDto {
    pub articles: Vec<ArticleDoc>,
}

impl ArticlesResponseDto {
    #[must_use]
    pub fn new(articles: Vec<ArticleDoc>) -> Self {
        Self { articles }
    }

    #[must_use]
    pub fn single(article: ArticleDoc) -> Self {
        Self {
            articles: vec![article],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FollowingResponseDto {
    pub username: String,
    pub following: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentAuthorDto {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Profile field reads and writes echo `{"username", "<field>": value}`
/// with the field name varying per route.
#[must_use]
pub fn profile_field_response(username: &str, field: &str, value: &Value) -> Value {
    json!({"username": username, field: value})
}
