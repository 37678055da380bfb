// SPDX-License-Identifier: Apache-2.0

use super::{
    content_type_for, extension_for, sha256_hex, valid_media_id, MediaError, MediaStoreBackend,
    StoredMedia,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 120,
        }
    }
}

/// Flat directory of content-addressed files. The default backend.
pub struct LocalFsMediaStore {
    root: PathBuf,
    public_base: String,
}

impl LocalFsMediaStore {
    #[must_use]
    pub fn new(root: PathBuf, public_base: &str) -> Self {
        Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn object_path(&self, media_id: &str) -> Result<PathBuf, MediaError> {
        if !valid_media_id(media_id) {
            return Err(MediaError(format!("invalid media id: {media_id}")));
        }
        Ok(self.root.join(media_id))
    }

    fn public_url(&self, media_id: &str) -> String {
        format!("{}/media/{media_id}", self.public_base)
    }

    fn read_safe(&self, path: &Path) -> Result<Vec<u8>, MediaError> {
        let root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let parent = path
            .parent()
            .ok_or_else(|| MediaError("path traversal blocked: missing parent".to_string()))?;
        let canonical_parent = parent
            .canonicalize()
            .map_err(|e| MediaError(format!("path traversal check failed: {e}")))?;
        if !canonical_parent.starts_with(&root) {
            return Err(MediaError("path traversal blocked".to_string()));
        }
        fs::read(path).map_err(|e| MediaError(format!("read failed: {e}")))
    }
}

#[async_trait]
impl MediaStoreBackend for LocalFsMediaStore {
    fn backend_tag(&self) -> &'static str {
        "localfs"
    }

    async fn put_object(
        &self,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredMedia, MediaError> {
        let media_id = format!("{}.{}", sha256_hex(&bytes), extension_for(content_type));
        let path = self.object_path(&media_id)?;
        if !path.exists() {
            fs::create_dir_all(&self.root)
                .map_err(|e| MediaError(format!("media root create failed: {e}")))?;
            // Write-then-rename so a crashed upload never leaves a partial
            // object under its final name.
            let tmp = self.root.join(format!("{media_id}.tmp"));
            fs::write(&tmp, &bytes).map_err(|e| MediaError(format!("media write failed: {e}")))?;
            fs::rename(&tmp, &path)
                .map_err(|e| MediaError(format!("media rename failed: {e}")))?;
        }
        Ok(StoredMedia {
            url: self.public_url(&media_id),
            media_id,
        })
    }

    async fn fetch_object(&self, media_id: &str) -> Result<(String, Vec<u8>), MediaError> {
        let path = self.object_path(media_id)?;
        let bytes = self.read_safe(&path)?;
        Ok((content_type_for(media_id).to_string(), bytes))
    }
}

/// Remote object store spoken to over plain HTTP PUT/GET, e.g. an S3
/// gateway or a blob-serving sidecar.
pub struct HttpMediaStore {
    base_url: String,
    public_base: String,
    auth_bearer: Option<String>,
    retry: RetryPolicy,
    allow_private_hosts: bool,
}

impl HttpMediaStore {
    #[must_use]
    pub fn new(
        base_url: String,
        public_base: &str,
        auth_bearer: Option<String>,
        retry: RetryPolicy,
        allow_private_hosts: bool,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
            auth_bearer,
            retry,
            allow_private_hosts,
        }
    }

    fn object_url(&self, media_id: &str) -> String {
        format!("{}/{media_id}", self.base_url)
    }

    fn public_url(&self, media_id: &str) -> String {
        format!("{}/media/{media_id}", self.public_base)
    }

    fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }

    fn validate_url(&self, url: &str) -> Result<(), MediaError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| MediaError(format!("invalid media url: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| MediaError("media url missing host".to_string()))?
            .to_ascii_lowercase();
        if !self.allow_private_hosts && (host == "localhost" || host.ends_with(".localhost")) {
            return Err(MediaError("blocked media host: localhost".to_string()));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            let private = match ip {
                IpAddr::V4(v4) => {
                    v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_broadcast()
                }
                IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || v6.is_unique_local(),
            };
            if private && !self.allow_private_hosts {
                return Err(MediaError("blocked private media host".to_string()));
            }
        }
        Ok(())
    }

    fn auth_headers(&self) -> Result<HeaderMap, MediaError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| MediaError(format!("invalid auth header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    #[instrument(name = "media_http_put_with_retry", skip(self, bytes))]
    async fn put_with_retry(
        &self,
        url: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), MediaError> {
        self.validate_url(url)?;
        let client = self.client();
        let headers = self.auth_headers()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let req = client
                .put(url)
                .headers(headers.clone())
                .header(CONTENT_TYPE, content_type)
                .body(bytes.to_vec());
            match req.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(MediaError(format!(
                            "upload failed status={} url={url}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(MediaError(format!("upload failed url={url}: {e}")));
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(
                self.retry.base_backoff_ms.saturating_mul(attempt as u64),
            ))
            .await;
        }
    }

    #[instrument(name = "media_http_get_with_retry", skip(self))]
    async fn get_with_retry(&self, url: &str) -> Result<(Option<String>, Vec<u8>), MediaError> {
        self.validate_url(url)?;
        let client = self.client();
        let headers = self.auth_headers()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let req = client.get(url).headers(headers.clone());
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let content_type = resp
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(ToString::to_string);
                    let bytes = resp
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .map_err(|e| MediaError(format!("read body failed: {e}")))?;
                    return Ok((content_type, bytes));
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(MediaError(format!(
                            "download failed status={} url={url}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(MediaError(format!("download failed url={url}: {e}")));
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(
                self.retry.base_backoff_ms.saturating_mul(attempt as u64),
            ))
            .await;
        }
    }
}

#[async_trait]
impl MediaStoreBackend for HttpMediaStore {
    fn backend_tag(&self) -> &'static str {
        "http"
    }

    async fn put_object(
        &self,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredMedia, MediaError> {
        let media_id = format!("{}.{}", sha256_hex(&bytes), extension_for(content_type));
        let url = self.object_url(&media_id);
        self.put_with_retry(&url, content_type, &bytes).await?;
        Ok(StoredMedia {
            url: self.public_url(&media_id),
            media_id,
        })
    }

    async fn fetch_object(&self, media_id: &str) -> Result<(String, Vec<u8>), MediaError> {
        if !valid_media_id(media_id) {
            return Err(MediaError(format!("invalid media id: {media_id}")));
        }
        let url = self.object_url(media_id);
        let (content_type, bytes) = self.get_with_retry(&url).await?;
        Ok((
            content_type.unwrap_or_else(|| content_type_for(media_id).to_string()),
            bytes,
        ))
    }
}
