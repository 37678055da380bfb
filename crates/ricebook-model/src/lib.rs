#![forbid(unsafe_code)]
//! Ricebook domain model SSOT.
//!
//! Every identifier that crosses a trust boundary (route path, request body,
//! stored document) has a parsed newtype here; raw strings stop at the edge.

mod article;
mod identity;
mod profile;
mod user;

pub use article::{
    next_comment_id, ArticleDoc, ArticleId, CommentDoc, CommentId, ARTICLE_TEXT_MAX_LEN,
    COMMENT_BODY_MAX_LEN,
};
pub use identity::{GoogleIdentity, GoogleUid, ParseError, Username, GOOGLE_UID_MAX_LEN,
    USERNAME_MAX_LEN};
pub use profile::{
    Email, Headline, Phone, ProfileDoc, Zipcode, AVATAR_URL_MAX_LEN, DOB_MAX_LEN, EMAIL_MAX_LEN,
    HEADLINE_MAX_LEN,
};
pub use user::{UserId, UserRecord};

pub const CRATE_NAME: &str = "ricebook-model";
