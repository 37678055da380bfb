// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Ricebook API server: session-cookie auth, profiles, articles with
//! embedded comments, follow lists, Google sign-in, and media uploads,
//! over a SQLite-backed document store.

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::Router;
use ricebook_store::DocumentStore;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod auth;
mod config;
mod http;
mod media;
mod middleware;
mod telemetry;

pub const CRATE_NAME: &str = "ricebook-server";

pub use auth::{SessionIdentity, SessionStore};
pub use config::{
    validate_startup_config_contract, ApiConfig, CONFIG_SCHEMA_VERSION, DEV_SESSION_SECRET,
};
pub use media::{
    FakeMediaStore, HttpMediaStore, LocalFsMediaStore, MediaError, MediaStoreBackend, RetryPolicy,
    StoredMedia,
};

use middleware::cors::cors_middleware;
use middleware::request_tracing::request_tracing_middleware;
use middleware::security::security_middleware;
use middleware::session_guard::session_guard_middleware;
use telemetry::metrics::RequestMetrics;
use telemetry::rate_limiter::RateLimiter;
use telemetry::redis_backend::{RedisBackend, RedisPolicy};

/// Milliseconds since the Unix epoch. Session expiry and article dates
/// share this clock.
pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub sessions: Arc<SessionStore>,
    pub media: Arc<dyn MediaStoreBackend>,
    pub api: ApiConfig,
    pub ready: Arc<AtomicBool>,
    pub accepting_requests: Arc<AtomicBool>,
    pub(crate) login_limiter: Arc<RateLimiter>,
    pub(crate) metrics: Arc<RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
    pub(crate) redis: Option<Arc<RedisBackend>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<DocumentStore>, media: Arc<dyn MediaStoreBackend>) -> Self {
        Self::with_config(store, media, ApiConfig::default())
    }

    #[must_use]
    pub fn with_config(
        store: Arc<DocumentStore>,
        media: Arc<dyn MediaStoreBackend>,
        api: ApiConfig,
    ) -> Self {
        let redis_policy = RedisPolicy {
            timeout: Duration::from_millis(api.redis_timeout_ms),
            retry_attempts: api.redis_retry_attempts.max(1),
            breaker_failure_threshold: api.redis_breaker_failure_threshold,
            breaker_open_duration: Duration::from_millis(api.redis_breaker_open_ms),
            ..RedisPolicy::default()
        };
        let redis = api
            .redis_url
            .as_deref()
            .and_then(|u| RedisBackend::new(u, &api.redis_prefix, redis_policy).ok())
            .map(Arc::new);
        let sessions = Arc::new(SessionStore::new(
            Arc::clone(&store),
            &api.session_secret,
            Duration::from_secs(api.session_ttl_secs),
            if api.enable_redis_sessions {
                redis.clone()
            } else {
                None
            },
        ));
        Self {
            store,
            sessions,
            media,
            ready: Arc::new(AtomicBool::new(true)),
            accepting_requests: Arc::new(AtomicBool::new(true)),
            login_limiter: Arc::new(RateLimiter::new(
                if api.enable_redis_rate_limit {
                    redis.clone()
                } else {
                    None
                },
                "auth",
            )),
            metrics: Arc::new(RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
            redis,
            api,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Upload routes carry their own body cap; everything else inherits
    // the router-wide JSON cap below.
    let upload_limit = DefaultBodyLimit::max(state.api.max_upload_bytes);
    Router::new()
        .route("/", get(http::ops::landing_handler))
        .route("/login", post(http::session::login_handler))
        .route("/register", post(http::session::register_handler))
        .route("/logout", put(http::session::logout_handler))
        .route(
            "/auth/googleRegister",
            post(http::identity::google_register_handler),
        )
        .route("/linkThirdPartyUser", post(http::identity::link_handler))
        .route("/unlinkThirdPartyUser", delete(http::identity::unlink_handler))
        .route(
            "/article",
            post(http::articles::create_article_handler).layer(upload_limit.clone()),
        )
        .route("/articles", get(http::articles::get_articles_handler))
        .route(
            "/articles/:id",
            get(http::articles::get_articles_handler)
                .put(http::articles::update_article_handler),
        )
        .route(
            "/getCommentAuthor/:articleId/:commentId",
            get(http::articles::comment_author_handler),
        )
        .route(
            "/headline",
            get(http::profile::headline_get_handler).put(http::profile::headline_put_handler),
        )
        .route("/headline/:user", get(http::profile::headline_get_handler))
        .route(
            "/email",
            get(http::profile::email_get_handler).put(http::profile::email_put_handler),
        )
        .route("/email/:user", get(http::profile::email_get_handler))
        .route(
            "/zipcode",
            get(http::profile::zipcode_get_handler).put(http::profile::zipcode_put_handler),
        )
        .route("/zipcode/:user", get(http::profile::zipcode_get_handler))
        .route(
            "/phone",
            get(http::profile::phone_get_handler).put(http::profile::phone_put_handler),
        )
        .route("/phone/:user", get(http::profile::phone_get_handler))
        .route("/dob", get(http::profile::dob_get_handler))
        .route("/dob/:user", get(http::profile::dob_get_handler))
        .route(
            "/avatar",
            get(http::profile::avatar_get_handler)
                .put(http::profile::avatar_put_handler)
                .layer(upload_limit),
        )
        .route("/avatar/:user", get(http::profile::avatar_get_handler))
        .route("/password", put(http::profile::password_put_handler))
        .route("/following", get(http::following::following_get_handler))
        .route(
            "/following/:user",
            get(http::following::following_get_handler)
                .put(http::following::follow_put_handler)
                .delete(http::following::follow_delete_handler),
        )
        .route("/media/:id", get(http::media::media_fetch_handler))
        .route("/healthz", get(http::ops::healthz_handler))
        .route("/readyz", get(http::ops::readyz_handler))
        .route("/version", get(http::ops::version_handler))
        .route("/metrics", get(http::ops::metrics_handler))
        .layer(from_fn_with_state(state.clone(), session_guard_middleware))
        .layer(from_fn_with_state(state.clone(), cors_middleware))
        .layer(from_fn_with_state(state.clone(), security_middleware))
        .layer(from_fn_with_state(state.clone(), request_tracing_middleware))
        .layer(DefaultBodyLimit::max(state.api.max_body_bytes))
        .with_state(state)
}
