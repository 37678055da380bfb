#![forbid(unsafe_code)]

mod errors;
mod params;
mod responses;
mod surface;

pub use errors::{ApiError, ApiErrorCode};
pub use params::{
    parse_feed_limit, ArticleSelector, CommentTarget, DEFAULT_FEED_LIMIT, MAX_FEED_LIMIT,
};
pub use responses::{
    profile_field_response, ArticlesResponseDto, CommentAuthorDto, FollowingResponseDto,
    SessionResultDto,
};
pub use surface::endpoints_v1;

pub const CRATE_NAME: &str = "ricebook-api";
