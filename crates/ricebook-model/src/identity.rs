// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const USERNAME_MAX_LEN: usize = 32;
pub const GOOGLE_UID_MAX_LEN: usize = 128;
pub const DISPLAY_NAME_MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    Empty(&'static str),
    Trimmed(&'static str),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty(name) => write!(f, "{name} must not be empty"),
            Self::Trimmed(name) => {
                write!(f, "{name} must not contain leading/trailing whitespace")
            }
            Self::TooLong(name, max) => write!(f, "{name} exceeds max length {max}"),
            Self::InvalidFormat(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ParseError {}

/// Account handle. Lowercase alphanumeric plus underscore, starts with a
/// letter. Authorship and follow edges key on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct Username(String);

impl Username {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("username"));
        }
        if input.trim() != input {
            return Err(ParseError::Trimmed("username"));
        }
        if input.len() > USERNAME_MAX_LEN {
            return Err(ParseError::TooLong("username", USERNAME_MAX_LEN));
        }
        let mut chars = input.chars();
        let first = chars.next().unwrap_or('0');
        if !first.is_ascii_lowercase() {
            return Err(ParseError::InvalidFormat(
                "username must start with a lowercase letter",
            ));
        }
        if !input
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ParseError::InvalidFormat(
                "username must match [a-z][a-z0-9_]*",
            ));
        }
        Ok(Self(input.to_string()))
    }

    /// Collapse an arbitrary display string into the username charset.
    /// Returns `None` when nothing usable survives.
    #[must_use]
    pub fn sanitize(raw: &str) -> Option<Self> {
        let mut out = String::new();
        for c in raw.trim().chars() {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
                out.push(lower);
            } else if (c == ' ' || c == '.' || c == '-' || c == '_') && !out.ends_with('_') {
                out.push('_');
            }
            if out.len() == USERNAME_MAX_LEN {
                break;
            }
        }
        let trimmed = out.trim_matches('_').to_string();
        if trimmed.is_empty() {
            return None;
        }
        let candidate = if trimmed.starts_with(|c: char| c.is_ascii_lowercase()) {
            trimmed
        } else {
            let mut prefixed = String::from("u_");
            prefixed.push_str(&trimmed);
            prefixed.truncate(USERNAME_MAX_LEN);
            prefixed
        };
        Self::parse(&candidate).ok()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque subject identifier issued by the third-party sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct GoogleUid(String);

impl GoogleUid {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("google uid"));
        }
        if input.trim() != input {
            return Err(ParseError::Trimmed("google uid"));
        }
        if input.len() > GOOGLE_UID_MAX_LEN {
            return Err(ParseError::TooLong("google uid", GOOGLE_UID_MAX_LEN));
        }
        if !input.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ParseError::InvalidFormat(
                "google uid must match [A-Za-z0-9_-]+",
            ));
        }
        Ok(Self(input.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The identity assertion shape posted by the SPA after its sign-in popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct GoogleIdentity {
    pub uid: GoogleUid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl GoogleIdentity {
    pub fn new(
        uid: GoogleUid,
        display_name: Option<String>,
        email: Option<String>,
        photo_url: Option<String>,
    ) -> Result<Self, ParseError> {
        if let Some(name) = &display_name {
            if name.len() > DISPLAY_NAME_MAX_LEN {
                return Err(ParseError::TooLong("display name", DISPLAY_NAME_MAX_LEN));
            }
        }
        Ok(Self {
            uid,
            display_name,
            email,
            photo_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rejects_uppercase_and_leading_digit() {
        assert!(Username::parse("Alice").is_err());
        assert!(Username::parse("9lives").is_err());
        assert!(Username::parse("alice_9").is_ok());
    }

    #[test]
    fn username_rejects_padding() {
        assert!(matches!(
            Username::parse(" bob"),
            Err(ParseError::Trimmed("username"))
        ));
        assert!(matches!(
            Username::parse(""),
            Err(ParseError::Empty("username"))
        ));
    }

    #[test]
    fn sanitize_collapses_display_names() {
        assert_eq!(
            Username::sanitize("Jane Q. Doe").unwrap().as_str(),
            "jane_q_doe"
        );
        assert_eq!(Username::sanitize("  Bob  ").unwrap().as_str(), "bob");
        assert_eq!(Username::sanitize("42fish").unwrap().as_str(), "u_42fish");
        assert!(Username::sanitize("!!!").is_none());
    }

    #[test]
    fn sanitize_respects_max_len() {
        let long = "x".repeat(200);
        let got = Username::sanitize(&long).unwrap();
        assert!(got.as_str().len() <= USERNAME_MAX_LEN);
    }

    #[test]
    fn google_uid_charset() {
        assert!(GoogleUid::parse("a1B2-c3_D4").is_ok());
        assert!(GoogleUid::parse("has space").is_err());
        assert!(GoogleUid::parse("").is_err());
    }
}
