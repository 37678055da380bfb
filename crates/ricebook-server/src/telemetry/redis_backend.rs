// SPDX-License-Identifier: Apache-2.0

//! Optional Redis tier shared by replicas: a session-token mirror and a
//! fixed-window rate limiter. Every command runs under a timeout, a small
//! retry budget, and a circuit breaker; callers treat any `Err` as a cue
//! to fall back to process-local state.

use crate::telemetry::rate_limiter::RateLimitConfig;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub(crate) struct RedisPolicy {
    pub timeout: Duration,
    pub retry_attempts: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_open_duration: Duration,
    pub max_key_bytes: usize,
}

impl Default for RedisPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(200),
            retry_attempts: 2,
            breaker_failure_threshold: 5,
            breaker_open_duration: Duration::from_millis(3000),
            max_key_bytes: 256,
        }
    }
}

#[derive(Default)]
struct RedisBreakerState {
    failure_count: u32,
    open_until: Option<Instant>,
}

#[derive(Default)]
pub(crate) struct RedisMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub read_fallbacks: AtomicU64,
    pub write_fallbacks: AtomicU64,
    pub rate_limit_fallbacks: AtomicU64,
    pub breaker_open_total: AtomicU64,
    pub breaker_reject_total: AtomicU64,
    pub key_reject_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RedisMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub read_fallbacks: u64,
    pub write_fallbacks: u64,
    pub rate_limit_fallbacks: u64,
    pub breaker_open_total: u64,
    pub breaker_reject_total: u64,
    pub key_reject_total: u64,
}

#[derive(Clone)]
pub(crate) struct RedisBackend {
    client: redis::Client,
    prefix: String,
    policy: RedisPolicy,
    breaker: Arc<Mutex<RedisBreakerState>>,
    pub metrics: Arc<RedisMetrics>,
}

impl RedisBackend {
    pub(crate) fn new(url: &str, prefix: &str, policy: RedisPolicy) -> Result<Self, String> {
        let client = redis::Client::open(url).map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            policy,
            breaker: Arc::new(Mutex::new(RedisBreakerState::default())),
            metrics: Arc::new(RedisMetrics::default()),
        })
    }

    fn session_key(&self, token: &str) -> String {
        format!("{}:sess:{token}", self.prefix)
    }

    fn user_index_key(&self, username: &str) -> String {
        format!("{}:usersess:{username}", self.prefix)
    }

    async fn breaker_check(&self) -> Result<(), String> {
        let lock = self.breaker.lock().await;
        if let Some(until) = lock.open_until {
            if Instant::now() < until {
                self.metrics
                    .breaker_reject_total
                    .fetch_add(1, Ordering::Relaxed);
                return Err("redis breaker open".to_string());
            }
        }
        Ok(())
    }

    async fn record_failure(&self, fallback_counter: &AtomicU64, msg: &str) -> String {
        fallback_counter.fetch_add(1, Ordering::Relaxed);
        let mut lock = self.breaker.lock().await;
        lock.failure_count += 1;
        if lock.failure_count >= self.policy.breaker_failure_threshold {
            lock.open_until = Some(Instant::now() + self.policy.breaker_open_duration);
            self.metrics
                .breaker_open_total
                .fetch_add(1, Ordering::Relaxed);
        }
        msg.to_string()
    }

    async fn record_success(&self) {
        let mut lock = self.breaker.lock().await;
        lock.failure_count = 0;
        lock.open_until = None;
    }

    async fn with_retry<T, Fut, F>(&self, mut op: F) -> Result<T, String>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, String>>,
    {
        let attempts = self.policy.retry_attempts.max(1);
        let mut last = None;
        for i in 0..attempts {
            match timeout(self.policy.timeout, op()).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => last = Some(e),
                Err(_) => last = Some("redis timeout".to_string()),
            }
            if i + 1 < attempts {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        Err(last.unwrap_or_else(|| "redis failure".to_string()))
    }

    pub(crate) async fn metrics_snapshot(&self) -> RedisMetricsSnapshot {
        RedisMetricsSnapshot {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            read_fallbacks: self.metrics.read_fallbacks.load(Ordering::Relaxed),
            write_fallbacks: self.metrics.write_fallbacks.load(Ordering::Relaxed),
            rate_limit_fallbacks: self.metrics.rate_limit_fallbacks.load(Ordering::Relaxed),
            breaker_open_total: self.metrics.breaker_open_total.load(Ordering::Relaxed),
            breaker_reject_total: self.metrics.breaker_reject_total.load(Ordering::Relaxed),
            key_reject_total: self.metrics.key_reject_total.load(Ordering::Relaxed),
        }
    }

    /// Fixed one-second window counter keyed by scope and caller identity.
    /// The cap is derived from the refill rate so local and shared limiting
    /// converge on the same steady-state throughput.
    pub(crate) async fn rate_limit_allow(
        &self,
        scope: &str,
        key: &str,
        cfg: &RateLimitConfig,
    ) -> Result<bool, String> {
        self.breaker_check().await?;
        let sec = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_secs();
        let window_key = format!("{}:rl:{scope}:{key}:{sec}", self.prefix);
        let cap = cfg.refill_per_sec.ceil().max(1.0) as i64;
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let window_key = window_key.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let count: i64 = conn
                        .incr(&window_key, 1_i64)
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: bool = conn
                        .expire(&window_key, 2_i64)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(count <= cap)
                }
            })
            .await;
        match result {
            Ok(v) => {
                self.record_success().await;
                Ok(v)
            }
            Err(e) => Err(self
                .record_failure(&self.metrics.rate_limit_fallbacks, &e)
                .await),
        }
    }

    pub(crate) async fn get_session(&self, token: &str) -> Result<Option<String>, String> {
        self.breaker_check().await?;
        let session_key = self.session_key(token);
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let session_key = session_key.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    conn.get(session_key).await.map_err(|e| e.to_string())
                }
            })
            .await;
        match result {
            Ok(Some(v)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(Some(v))
            }
            Ok(None) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(None)
            }
            Err(e) => Err(self.record_failure(&self.metrics.read_fallbacks, &e).await),
        }
    }

    /// Mirrors a session token and enrolls it in the owner's index set so
    /// `delete_sessions_for_user` can revoke across replicas.
    pub(crate) async fn set_session(
        &self,
        token: &str,
        username: &str,
        payload: &str,
        ttl_secs: u64,
    ) -> Result<(), String> {
        self.breaker_check().await?;
        if token.len() > self.policy.max_key_bytes {
            self.metrics
                .key_reject_total
                .fetch_add(1, Ordering::Relaxed);
            return Err("redis key rejected by max key size policy".to_string());
        }
        let ttl = ttl_secs.max(1);
        let session_key = self.session_key(token);
        let index_key = self.user_index_key(username);
        let payload = payload.to_string();
        let token = token.to_string();
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let session_key = session_key.clone();
                let index_key = index_key.clone();
                let payload = payload.clone();
                let token = token.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: () = conn
                        .set_ex(&session_key, payload, ttl)
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: i64 = conn
                        .sadd(&index_key, &token)
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: bool = conn
                        .expire(&index_key, ttl as i64)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(())
                }
            })
            .await;
        match result {
            Ok(()) => {
                self.record_success().await;
                Ok(())
            }
            Err(e) => Err(self.record_failure(&self.metrics.write_fallbacks, &e).await),
        }
    }

    pub(crate) async fn delete_session(&self, token: &str, username: &str) -> Result<bool, String> {
        self.breaker_check().await?;
        let session_key = self.session_key(token);
        let index_key = self.user_index_key(username);
        let token = token.to_string();
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let session_key = session_key.clone();
                let index_key = index_key.clone();
                let token = token.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let removed: i64 = conn.del(&session_key).await.map_err(|e| e.to_string())?;
                    let _: i64 = conn
                        .srem(&index_key, &token)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(removed > 0)
                }
            })
            .await;
        match result {
            Ok(v) => {
                self.record_success().await;
                Ok(v)
            }
            Err(e) => Err(self.record_failure(&self.metrics.write_fallbacks, &e).await),
        }
    }

    /// Drops every mirrored token owned by `username`. Used on password
    /// change and account deletion so revocation reaches peer replicas.
    pub(crate) async fn delete_sessions_for_user(&self, username: &str) -> Result<u64, String> {
        self.breaker_check().await?;
        let index_key = self.user_index_key(username);
        let prefix = self.prefix.clone();
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let index_key = index_key.clone();
                let prefix = prefix.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let tokens: Vec<String> = conn
                        .smembers(&index_key)
                        .await
                        .map_err(|e| e.to_string())?;
                    let mut removed = 0_u64;
                    for token in &tokens {
                        let n: i64 = conn
                            .del(format!("{prefix}:sess:{token}"))
                            .await
                            .map_err(|e| e.to_string())?;
                        removed += n.max(0) as u64;
                    }
                    let _: i64 = conn.del(&index_key).await.map_err(|e| e.to_string())?;
                    Ok(removed)
                }
            })
            .await;
        match result {
            Ok(v) => {
                self.record_success().await;
                Ok(v)
            }
            Err(e) => Err(self.record_failure(&self.metrics.write_fallbacks, &e).await),
        }
    }
}
