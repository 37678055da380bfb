// SPDX-License-Identifier: Apache-2.0

//! In-memory media backend for tests: same addressing scheme as the real
//! backends, plus call counters so tests can assert interaction shapes.

use super::{extension_for, sha256_hex, MediaError, MediaStoreBackend, StoredMedia};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeMediaStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
    pub put_calls: AtomicU64,
    pub fetch_calls: AtomicU64,
}

impl FakeMediaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MediaStoreBackend for FakeMediaStore {
    fn backend_tag(&self) -> &'static str {
        "fake"
    }

    async fn put_object(
        &self,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredMedia, MediaError> {
        self.put_calls.fetch_add(1, Ordering::Relaxed);
        let media_id = format!("{}.{}", sha256_hex(&bytes), extension_for(content_type));
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| MediaError("fake media store poisoned".to_string()))?;
        objects.insert(media_id.clone(), (content_type.to_string(), bytes));
        Ok(StoredMedia {
            url: format!("/media/{media_id}"),
            media_id,
        })
    }

    async fn fetch_object(&self, media_id: &str) -> Result<(String, Vec<u8>), MediaError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        let objects = self
            .objects
            .lock()
            .map_err(|_| MediaError("fake media store poisoned".to_string()))?;
        objects
            .get(media_id)
            .cloned()
            .ok_or_else(|| MediaError(format!("object not found: {media_id}")))
    }
}
