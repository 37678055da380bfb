// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration for the Ricebook API server.
//!
//! Every field maps to a `RICEBOOK_*` environment variable wired up in
//! `main.rs`. Defaults are development-friendly; `validate_startup_config_contract`
//! is the single gate that decides whether a configuration is allowed to boot.

/// Bumped whenever the meaning of a config field changes incompatibly.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Placeholder secret used when `RICEBOOK_SESSION_SECRET` is unset.
/// Good enough for local development, rejected once `cookie_secure` is on.
pub const DEV_SESSION_SECRET: &str = "ricebook-dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Listen address, e.g. `0.0.0.0:3001`.
    pub bind_addr: String,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// When true the session cookie carries `Secure; SameSite=None` so a
    /// cross-site SPA deployment can send it. Requires a real secret.
    pub cookie_secure: bool,
    /// HMAC key for minting session tokens.
    pub session_secret: String,
    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Interval between expired-session sweeps.
    pub session_sweep_interval_secs: u64,
    /// Origins allowed to make credentialed cross-origin requests.
    pub cors_allowed_origins: Vec<String>,
    /// Body cap for ordinary JSON routes.
    pub max_body_bytes: usize,
    /// Body cap for the multipart upload routes (`POST /article`, `PUT /avatar`).
    pub max_upload_bytes: usize,
    /// Cap for a single uploaded image inside a multipart body.
    pub max_image_bytes: usize,
    /// Request line cap enforced by the security middleware.
    pub max_uri_bytes: usize,
    /// Total header bytes cap enforced by the security middleware.
    pub max_header_bytes: usize,
    /// Token-bucket size for the credential endpoints (`/login`, `/register`).
    pub auth_rate_capacity: f64,
    /// Token-bucket refill rate per second for the credential endpoints.
    pub auth_rate_refill_per_sec: f64,
    /// Avatar assigned to accounts that register without uploading one.
    pub default_avatar_url: String,
    /// Emit one `ricebook_audit` line per request.
    pub enable_audit_log: bool,
    /// Optional Redis endpoint for shared sessions and rate limits.
    pub redis_url: Option<String>,
    /// Key prefix for every Redis key this server writes.
    pub redis_prefix: String,
    /// Mirror session tokens into Redis so peer replicas accept them.
    pub enable_redis_sessions: bool,
    /// Enforce rate limits through Redis instead of per-process buckets.
    pub enable_redis_rate_limit: bool,
    /// Per-command Redis timeout.
    pub redis_timeout_ms: u64,
    /// Attempts per Redis command before falling back to local behavior.
    pub redis_retry_attempts: usize,
    /// Consecutive failures before the Redis circuit breaker opens.
    pub redis_breaker_failure_threshold: u32,
    /// How long an open breaker rejects Redis traffic.
    pub redis_breaker_open_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".to_string(),
            cookie_name: "sid".to_string(),
            cookie_secure: false,
            session_secret: DEV_SESSION_SECRET.to_string(),
            session_ttl_secs: 86_400,
            session_sweep_interval_secs: 60,
            cors_allowed_origins: Vec::new(),
            max_body_bytes: 64 * 1024,
            max_upload_bytes: 6 * 1024 * 1024,
            max_image_bytes: 5 * 1024 * 1024,
            max_uri_bytes: 8 * 1024,
            max_header_bytes: 16 * 1024,
            auth_rate_capacity: 10.0,
            auth_rate_refill_per_sec: 0.5,
            default_avatar_url: "https://static.ricebook.example/avatar-default.png".to_string(),
            enable_audit_log: false,
            redis_url: None,
            redis_prefix: "ricebook".to_string(),
            enable_redis_sessions: false,
            enable_redis_rate_limit: false,
            redis_timeout_ms: 200,
            redis_retry_attempts: 2,
            redis_breaker_failure_threshold: 5,
            redis_breaker_open_ms: 3_000,
        }
    }
}

fn valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Rejects configurations that would boot into a broken or unsafe state.
/// Errors are meant for operators: short, specific, field-named.
pub fn validate_startup_config_contract(api: &ApiConfig) -> Result<(), String> {
    if api.bind_addr.trim().is_empty() {
        return Err("bind_addr must not be empty".to_string());
    }
    if !valid_cookie_name(&api.cookie_name) {
        return Err("cookie_name must be a cookie-safe token".to_string());
    }
    if api.session_secret.len() < 16 {
        return Err("session_secret must be at least 16 bytes".to_string());
    }
    if api.cookie_secure && api.session_secret == DEV_SESSION_SECRET {
        return Err("cookie_secure requires a non-default session_secret".to_string());
    }
    if api.session_ttl_secs == 0 {
        return Err("session_ttl_secs must be positive".to_string());
    }
    if api.session_sweep_interval_secs == 0 {
        return Err("session_sweep_interval_secs must be positive".to_string());
    }
    if api.max_body_bytes == 0 {
        return Err("max_body_bytes must be positive".to_string());
    }
    if api.max_image_bytes == 0 {
        return Err("max_image_bytes must be positive".to_string());
    }
    if api.max_upload_bytes < api.max_image_bytes {
        return Err("max_upload_bytes must be at least max_image_bytes".to_string());
    }
    if api.max_uri_bytes < 256 {
        return Err("max_uri_bytes must be at least 256".to_string());
    }
    if api.max_header_bytes < 512 {
        return Err("max_header_bytes must be at least 512".to_string());
    }
    if api.auth_rate_capacity < 1.0 {
        return Err("auth_rate_capacity must be at least 1".to_string());
    }
    if !(api.auth_rate_refill_per_sec > 0.0) {
        return Err("auth_rate_refill_per_sec must be positive".to_string());
    }
    if api.default_avatar_url.trim().is_empty() {
        return Err("default_avatar_url must not be empty".to_string());
    }
    for origin in &api.cors_allowed_origins {
        if origin.trim().is_empty() || origin.contains(char::is_whitespace) {
            return Err("cors_allowed_origins entries must be non-empty and whitespace-free".to_string());
        }
    }
    if (api.enable_redis_sessions || api.enable_redis_rate_limit) && api.redis_url.is_none() {
        return Err("redis-backed sessions or rate limits require redis_url".to_string());
    }
    if api.redis_url.is_some() {
        if api.redis_prefix.trim().is_empty() {
            return Err("redis_prefix must not be empty when redis_url is set".to_string());
        }
        if api.redis_retry_attempts == 0 {
            return Err("redis_retry_attempts must be at least 1".to_string());
        }
        if api.redis_timeout_ms == 0 {
            return Err("redis_timeout_ms must be positive".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_the_contract() {
        assert_eq!(validate_startup_config_contract(&ApiConfig::default()), Ok(()));
    }

    #[test]
    fn secure_cookies_reject_the_dev_secret() {
        let api = ApiConfig {
            cookie_secure: true,
            ..ApiConfig::default()
        };
        let err = validate_startup_config_contract(&api).unwrap_err();
        assert!(err.contains("non-default session_secret"), "{err}");

        let api = ApiConfig {
            cookie_secure: true,
            session_secret: "0123456789abcdef0123456789abcdef".to_string(),
            ..ApiConfig::default()
        };
        assert_eq!(validate_startup_config_contract(&api), Ok(()));
    }

    #[test]
    fn cookie_name_must_be_token_safe() {
        let api = ApiConfig {
            cookie_name: "sid;Path=/".to_string(),
            ..ApiConfig::default()
        };
        let err = validate_startup_config_contract(&api).unwrap_err();
        assert!(err.contains("cookie_name"), "{err}");
    }

    #[test]
    fn upload_cap_must_cover_one_image() {
        let api = ApiConfig {
            max_upload_bytes: 1024,
            ..ApiConfig::default()
        };
        let err = validate_startup_config_contract(&api).unwrap_err();
        assert!(err.contains("max_upload_bytes"), "{err}");
    }

    #[test]
    fn redis_features_require_an_endpoint() {
        let api = ApiConfig {
            enable_redis_sessions: true,
            ..ApiConfig::default()
        };
        let err = validate_startup_config_contract(&api).unwrap_err();
        assert!(err.contains("redis_url"), "{err}");

        let api = ApiConfig {
            enable_redis_sessions: true,
            redis_url: Some("redis://127.0.0.1:6379/0".to_string()),
            ..ApiConfig::default()
        };
        assert_eq!(validate_startup_config_contract(&api), Ok(()));
    }

    #[test]
    fn short_secrets_are_rejected() {
        let api = ApiConfig {
            session_secret: "short".to_string(),
            ..ApiConfig::default()
        };
        let err = validate_startup_config_contract(&api).unwrap_err();
        assert!(err.contains("session_secret"), "{err}");
    }

    #[test]
    fn rate_limit_knobs_must_be_sane() {
        let api = ApiConfig {
            auth_rate_refill_per_sec: 0.0,
            ..ApiConfig::default()
        };
        assert!(validate_startup_config_contract(&api).is_err());
    }
}
