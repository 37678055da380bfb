// SPDX-License-Identifier: Apache-2.0

//! Object storage behind article images and profile avatars.
//!
//! Objects are content-addressed: an id is the sha256 of the bytes plus an
//! extension derived from the declared content type. Re-uploading the same
//! image is idempotent, and ids embed safely in URLs and file paths.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub(crate) mod backends;
pub(crate) mod fake;

pub use backends::{HttpMediaStore, LocalFsMediaStore, RetryPolicy};
pub use fake::FakeMediaStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaError(pub String);

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MediaError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub media_id: String,
    pub url: String,
}

#[async_trait]
pub trait MediaStoreBackend: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str;

    /// Stores `bytes` and returns the id plus the URL clients should embed.
    async fn put_object(
        &self,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredMedia, MediaError>;

    /// Returns `(content_type, bytes)` for a previously stored object.
    async fn fetch_object(&self, media_id: &str) -> Result<(String, Vec<u8>), MediaError>;
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

pub(crate) fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    IMAGE_EXTENSIONS
        .iter()
        .find(|(ct, _)| essence.eq_ignore_ascii_case(ct))
        .map_or("bin", |(_, ext)| ext)
}

pub(crate) fn content_type_for(media_id: &str) -> &'static str {
    match media_id.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// `<64 lowercase hex>.<short alnum ext>` and nothing else. Anything that
/// fails this was not minted by `put_object` and is refused before a path
/// or URL is built from it.
pub(crate) fn valid_media_id(media_id: &str) -> bool {
    let Some((hash, ext)) = media_id.split_once('.') else {
        return false;
    };
    hash.len() == 64
        && hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
        && (1..=8).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}
