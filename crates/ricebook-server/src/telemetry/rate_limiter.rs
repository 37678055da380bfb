// SPDX-License-Identifier: Apache-2.0

//! Token-bucket limiter for the credential endpoints. Prefers the shared
//! Redis window when configured and falls back to per-process buckets the
//! moment Redis misbehaves.

use crate::telemetry::redis_backend::RedisBackend;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub(crate) struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    redis: Option<Arc<RedisBackend>>,
    scope: String,
}

impl RateLimiter {
    pub(crate) fn new(redis: Option<Arc<RedisBackend>>, scope: &str) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            redis,
            scope: scope.to_string(),
        }
    }

    pub(crate) async fn allow(&self, key: &str, cfg: &RateLimitConfig) -> bool {
        if let Some(redis) = &self.redis {
            match redis.rate_limit_allow(&self.scope, key, cfg).await {
                Ok(v) => return v,
                Err(e) => {
                    tracing::warn!(scope = %self.scope, "redis rate-limit fallback: {e}");
                }
            }
        }
        let now = Instant::now();
        let mut lock = self.buckets.lock().await;
        let bucket = lock.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: cfg.capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + (elapsed * cfg.refill_per_sec)).min(cfg.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn bucket_exhausts_then_denies() {
        let limiter = RateLimiter::new(None, "test");
        let cfg = RateLimitConfig {
            capacity: 2.0,
            refill_per_sec: 0.000_1,
        };
        assert!(limiter.allow("203.0.113.9", &cfg).await);
        assert!(limiter.allow("203.0.113.9", &cfg).await);
        assert!(!limiter.allow("203.0.113.9", &cfg).await);
    }

    #[tokio::test]
    async fn buckets_are_independent_per_key() {
        let limiter = RateLimiter::new(None, "test");
        let cfg = RateLimitConfig {
            capacity: 1.0,
            refill_per_sec: 0.000_1,
        };
        assert!(limiter.allow("alice", &cfg).await);
        assert!(!limiter.allow("alice", &cfg).await);
        assert!(limiter.allow("bob", &cfg).await);
    }

    #[tokio::test]
    async fn elapsed_time_refills_tokens() {
        let limiter = RateLimiter::new(None, "test");
        let cfg = RateLimitConfig {
            capacity: 5.0,
            refill_per_sec: 1.0,
        };
        {
            let mut lock = limiter.buckets.lock().await;
            lock.insert(
                "stale".to_string(),
                Bucket {
                    tokens: 0.0,
                    last_refill: Instant::now() - Duration::from_secs(10),
                },
            );
        }
        assert!(limiter.allow("stale", &cfg).await);
    }
}
