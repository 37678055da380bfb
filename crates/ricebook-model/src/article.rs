// SPDX-License-Identifier: Apache-2.0

use crate::identity::{ParseError, Username};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const ARTICLE_TEXT_MAX_LEN: usize = 10_000;
pub const COMMENT_BODY_MAX_LEN: usize = 2_000;

/// Store-wide monotonic article identifier. The SPA addresses articles by
/// this number, never by a storage rowid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(transparent)]
#[non_exhaustive]
pub struct ArticleId(u64);

impl ArticleId {
    #[must_use]
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("article id"));
        }
        if !input.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::InvalidFormat("article id must be numeric"));
        }
        input
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseError::InvalidFormat("article id out of range"))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for ArticleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Comment identifier, unique within its article and assigned max+1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(transparent)]
#[non_exhaustive]
pub struct CommentId(u64);

impl CommentId {
    #[must_use]
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("comment id"));
        }
        if !input.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::InvalidFormat("comment id must be numeric"));
        }
        input
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseError::InvalidFormat("comment id out of range"))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for CommentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentDoc {
    pub id: CommentId,
    pub author: Username,
    pub body: String,
    pub date: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl CommentDoc {
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.body.is_empty() {
            return Err(ParseError::Empty("comment body"));
        }
        if self.body.len() > COMMENT_BODY_MAX_LEN {
            return Err(ParseError::TooLong("comment body", COMMENT_BODY_MAX_LEN));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticleDoc {
    pub id: ArticleId,
    pub author: Username,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub date: u64,
    #[serde(default)]
    pub comments: Vec<CommentDoc>,
}

impl ArticleDoc {
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.text.is_empty() {
            return Err(ParseError::Empty("article text"));
        }
        if self.text.len() > ARTICLE_TEXT_MAX_LEN {
            return Err(ParseError::TooLong("article text", ARTICLE_TEXT_MAX_LEN));
        }
        for comment in &self.comments {
            comment.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn comment(&self, id: CommentId) -> Option<&CommentDoc> {
        self.comments.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn comment_mut(&mut self, id: CommentId) -> Option<&mut CommentDoc> {
        self.comments.iter_mut().find(|c| c.id == id)
    }
}

/// Next comment id for an article: one past the current maximum, starting
/// at 1. Holes never open because comments cannot be deleted, so the
/// sequence is strictly increasing per article.
#[must_use]
pub fn next_comment_id(existing: &[CommentDoc]) -> CommentId {
    let max = existing.iter().map(|c| c.id.as_u64()).max().unwrap_or(0);
    CommentId::from_u64(max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: u64) -> CommentDoc {
        CommentDoc {
            id: CommentId::from_u64(id),
            author: Username::parse("alice").expect("username"),
            body: "hi".to_string(),
            date: 0,
            avatar: None,
        }
    }

    #[test]
    fn article_id_parse_is_digits_only() {
        assert_eq!(ArticleId::parse("17").unwrap().as_u64(), 17);
        assert!(ArticleId::parse("17a").is_err());
        assert!(ArticleId::parse("-1").is_err());
        assert!(ArticleId::parse("").is_err());
    }

    #[test]
    fn first_comment_gets_id_one() {
        assert_eq!(next_comment_id(&[]).as_u64(), 1);
    }

    #[test]
    fn next_comment_id_is_max_plus_one() {
        let existing = vec![comment(1), comment(5), comment(3)];
        assert_eq!(next_comment_id(&existing).as_u64(), 6);
    }

    #[test]
    fn comment_lookup_by_id() {
        let mut article = ArticleDoc {
            id: ArticleId::from_u64(1),
            author: Username::parse("alice").expect("username"),
            text: "t".to_string(),
            image: None,
            date: 0,
            comments: vec![comment(1), comment(2)],
        };
        assert!(article.comment(CommentId::from_u64(2)).is_some());
        assert!(article.comment(CommentId::from_u64(9)).is_none());
        article
            .comment_mut(CommentId::from_u64(1))
            .expect("comment 1")
            .body = "edited".to_string();
        assert_eq!(article.comments[0].body, "edited");
    }

    #[test]
    fn validate_rejects_empty_text() {
        let article = ArticleDoc {
            id: ArticleId::from_u64(1),
            author: Username::parse("alice").expect("username"),
            text: String::new(),
            image: None,
            date: 0,
            comments: Vec::new(),
        };
        assert!(article.validate().is_err());
    }
}
