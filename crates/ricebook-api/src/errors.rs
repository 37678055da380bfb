// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ApiErrorCode {
    InvalidRequestBody,
    MissingField,
    InvalidFieldValue,
    NotLoggedIn,
    InvalidCredentials,
    Forbidden,
    NotFound,
    AlreadyExists,
    NotFollowing,
    IdentityAlreadyLinked,
    NoLinkedIdentity,
    PayloadTooLarge,
    UnsupportedMediaType,
    RateLimited,
    QueryRejectedByPolicy,
    NotReady,
    Internal,
}

/// Wire error envelope. Rendered under a top-level `"error"` key; the SPA
/// reads `data.error.message` on failure paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
    pub request_id: String,
}

impl ApiError {
    #[must_use]
    pub fn new(
        code: ApiErrorCode,
        message: impl Into<String>,
        details: Value,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            request_id: request_id.into(),
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    #[must_use]
    pub fn missing_field(name: &str) -> Self {
        Self::new(
            ApiErrorCode::MissingField,
            format!("{name} is required"),
            json!({"field": name}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn invalid_field(name: &str, reason: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidFieldValue,
            format!("invalid {name}"),
            json!({"field": name, "reason": reason}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn not_logged_in() -> Self {
        Self::new(
            ApiErrorCode::NotLoggedIn,
            "you are not logged in",
            json!({}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn invalid_credentials(message: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidCredentials,
            message,
            json!({}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn forbidden() -> Self {
        Self::new(ApiErrorCode::Forbidden, "forbidden", json!({}), "req-unknown")
    }

    #[must_use]
    pub fn not_found(what: &str) -> Self {
        Self::new(
            ApiErrorCode::NotFound,
            format!("{what} not found"),
            json!({"subject": what}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            ApiErrorCode::Internal,
            "internal server error",
            json!({}),
            "req-unknown",
        )
    }
}

const _: fn() = || {
    fn assert_traits<T: Serialize + for<'de> Deserialize<'de>>() {}
    assert_traits::<ApiErrorCode>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let err = ApiError::not_found("article").with_request_id("req-0000000000000007");
        let raw = serde_json::to_string(&err).expect("serialize");
        let back: ApiError = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(back, err);
        assert_eq!(back.code, ApiErrorCode::NotFound);
    }

    #[test]
    fn missing_field_names_the_field() {
        let err = ApiError::missing_field("text");
        assert_eq!(err.message, "text is required");
        assert_eq!(err.details.get("field").and_then(Value::as_str), Some("text"));
    }
}
