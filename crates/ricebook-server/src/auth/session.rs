// SPDX-License-Identifier: Apache-2.0

//! Session lifecycle. Tokens are opaque HMAC outputs handed to browsers in
//! a cookie. Live sessions sit in a process-local map, every session is
//! persisted as a store row so restarts keep users signed in, and when
//! Redis is configured tokens are mirrored there so peer replicas accept
//! them and revocation reaches all of them.

use crate::telemetry::redis_backend::RedisBackend;
use hmac::{Hmac, Mac};
use ricebook_model::{UserId, Username};
use ricebook_store::{DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

/// Who a request is acting as, resolved from the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub username: Username,
    pub user_id: UserId,
    pub expires_at: u64,
}

/// Wire form of a session in the Redis mirror.
#[derive(Debug, Serialize, Deserialize)]
struct MirroredSession {
    username: String,
    user_id: u64,
    expires_at: u64,
}

#[derive(Default)]
pub(crate) struct SessionMetrics {
    pub(crate) opened: AtomicU64,
    pub(crate) destroyed: AtomicU64,
    pub(crate) swept: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SessionMetricsSnapshot {
    pub opened: u64,
    pub destroyed: u64,
    pub swept: u64,
    pub active: u64,
}

pub struct SessionStore {
    secret: String,
    ttl: Duration,
    mint_seed: AtomicU64,
    live: Mutex<HashMap<String, SessionIdentity>>,
    store: Arc<DocumentStore>,
    redis: Option<Arc<RedisBackend>>,
    pub(crate) metrics: SessionMetrics,
}

impl SessionStore {
    pub fn new(
        store: Arc<DocumentStore>,
        secret: &str,
        ttl: Duration,
        redis: Option<Arc<RedisBackend>>,
    ) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Self {
            secret: secret.to_string(),
            ttl,
            mint_seed: AtomicU64::new(seed),
            live: Mutex::new(HashMap::new()),
            store,
            redis,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn run_store<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Backend(format!("store worker join: {e}")))?
    }

    /// Tokens are unguessable because the HMAC key is secret; the counter
    /// and clock only guarantee uniqueness within a process.
    fn mint_token(&self, username: &Username) -> Option<String> {
        let counter = self.mint_seed.fetch_add(1, Ordering::Relaxed);
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(format!("{counter}:{now_ns}:{}", username.as_str()).as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    pub async fn open_session(
        &self,
        username: &Username,
        user_id: UserId,
        now_ms: u64,
    ) -> Result<String, StoreError> {
        let token = self
            .mint_token(username)
            .ok_or_else(|| StoreError::Backend("session token mint failed".to_string()))?;
        let expires_at = now_ms + self.ttl.as_millis() as u64;
        {
            let token = token.clone();
            let username = username.clone();
            self.run_store(move |store| {
                store.put_session(&token, &username, user_id, now_ms, expires_at)
            })
            .await?;
        }
        self.live.lock().await.insert(
            token.clone(),
            SessionIdentity {
                username: username.clone(),
                user_id,
                expires_at,
            },
        );
        self.metrics.opened.fetch_add(1, Ordering::Relaxed);
        self.mirror_session(&token, username, user_id, expires_at, now_ms)
            .await;
        Ok(token)
    }

    async fn mirror_session(
        &self,
        token: &str,
        username: &Username,
        user_id: UserId,
        expires_at: u64,
        now_ms: u64,
    ) {
        let Some(redis) = &self.redis else {
            return;
        };
        let mirrored = MirroredSession {
            username: username.as_str().to_string(),
            user_id: user_id.as_u64(),
            expires_at,
        };
        let Ok(payload) = serde_json::to_string(&mirrored) else {
            return;
        };
        let ttl_secs = (expires_at.saturating_sub(now_ms) / 1000).max(1);
        if let Err(e) = redis
            .set_session(token, username.as_str(), &payload, ttl_secs)
            .await
        {
            tracing::warn!("redis session mirror write fallback: {e}");
        }
    }

    /// Memory first, then the durable row, then the Redis mirror for
    /// tokens a peer replica minted. Expired entries are never returned.
    pub async fn authenticate(&self, token: &str, now_ms: u64) -> Option<SessionIdentity> {
        {
            let mut live = self.live.lock().await;
            if let Some(identity) = live.get(token) {
                if identity.expires_at > now_ms {
                    return Some(identity.clone());
                }
                live.remove(token);
            }
        }
        let lookup = token.to_string();
        let row = self
            .run_store(move |store| store.session(&lookup))
            .await
            .ok()
            .flatten();
        if let Some(row) = row {
            if row.expires_at <= now_ms {
                return None;
            }
            let identity = SessionIdentity {
                username: row.username,
                user_id: row.user_id,
                expires_at: row.expires_at,
            };
            self.live
                .lock()
                .await
                .insert(token.to_string(), identity.clone());
            return Some(identity);
        }
        if let Some(redis) = &self.redis {
            match redis.get_session(token).await {
                Ok(Some(payload)) => {
                    if let Some(identity) = decode_mirrored(&payload, now_ms) {
                        self.live
                            .lock()
                            .await
                            .insert(token.to_string(), identity.clone());
                        return Some(identity);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("redis session mirror read fallback: {e}"),
            }
        }
        None
    }

    /// Ends one session. Returns false when the token does not name a live
    /// session, which callers surface as "not logged in".
    pub async fn destroy(&self, token: &str, now_ms: u64) -> bool {
        let identity = self.authenticate(token, now_ms).await;
        self.live.lock().await.remove(token);
        {
            let token = token.to_string();
            let _ = self
                .run_store(move |store| store.delete_session(&token))
                .await;
        }
        if let (Some(redis), Some(identity)) = (&self.redis, identity.as_ref()) {
            if let Err(e) = redis.delete_session(token, identity.username.as_str()).await {
                tracing::warn!("redis session mirror delete fallback: {e}");
            }
        }
        let destroyed = identity.is_some();
        if destroyed {
            self.metrics.destroyed.fetch_add(1, Ordering::Relaxed);
        }
        destroyed
    }

    /// Ends every session belonging to `username`. Used when an account is
    /// deleted through the unlink flow.
    pub async fn destroy_all_for(&self, username: &Username) -> u64 {
        self.live
            .lock()
            .await
            .retain(|_, identity| identity.username != *username);
        let removed = {
            let username = username.clone();
            self.run_store(move |store| store.delete_sessions_for(&username))
                .await
                .unwrap_or(0)
        };
        if let Some(redis) = &self.redis {
            if let Err(e) = redis.delete_sessions_for_user(username.as_str()).await {
                tracing::warn!("redis session mirror purge fallback: {e}");
            }
        }
        self.metrics.destroyed.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Ends every session for `username` except `keep_token`. Used on
    /// password change so stolen cookies stop working while the browser
    /// that changed the password stays signed in.
    pub async fn destroy_others(&self, username: &Username, keep_token: &str, now_ms: u64) -> u64 {
        let kept = {
            let token = keep_token.to_string();
            self.run_store(move |store| store.session(&token))
                .await
                .ok()
                .flatten()
        };
        {
            let mut live = self.live.lock().await;
            live.retain(|token, identity| identity.username != *username || token == keep_token);
        }
        let mut removed = {
            let username = username.clone();
            self.run_store(move |store| store.delete_sessions_for(&username))
                .await
                .unwrap_or(0)
        };
        if let Some(redis) = &self.redis {
            if let Err(e) = redis.delete_sessions_for_user(username.as_str()).await {
                tracing::warn!("redis session mirror purge fallback: {e}");
            }
        }
        if let Some(row) = kept {
            removed = removed.saturating_sub(1);
            let token = keep_token.to_string();
            let row_for_put = row.clone();
            let _ = self
                .run_store(move |store| {
                    store.put_session(
                        &token,
                        &row_for_put.username,
                        row_for_put.user_id,
                        row_for_put.created_at,
                        row_for_put.expires_at,
                    )
                })
                .await;
            self.mirror_session(keep_token, &row.username, row.user_id, row.expires_at, now_ms)
                .await;
        }
        self.metrics.destroyed.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    pub async fn sweep_expired(&self, now_ms: u64) -> u64 {
        self.live
            .lock()
            .await
            .retain(|_, identity| identity.expires_at > now_ms);
        let removed = self
            .run_store(move |store| store.sweep_expired_sessions(now_ms))
            .await
            .unwrap_or(0);
        if removed > 0 {
            self.metrics.swept.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let sessions = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = sessions.sweep_expired(crate::unix_now_ms()).await;
                if removed > 0 {
                    tracing::debug!(removed, "expired sessions swept");
                }
            }
        });
    }

    pub(crate) async fn metrics_snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            opened: self.metrics.opened.load(Ordering::Relaxed),
            destroyed: self.metrics.destroyed.load(Ordering::Relaxed),
            swept: self.metrics.swept.load(Ordering::Relaxed),
            active: self.live.lock().await.len() as u64,
        }
    }
}

fn decode_mirrored(payload: &str, now_ms: u64) -> Option<SessionIdentity> {
    let mirrored: MirroredSession = serde_json::from_str(payload).ok()?;
    if mirrored.expires_at <= now_ms {
        return None;
    }
    let username = Username::parse(&mirrored.username).ok()?;
    Some(SessionIdentity {
        username,
        user_id: UserId::from_u64(mirrored.user_id),
        expires_at: mirrored.expires_at,
    })
}
