// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use opentelemetry::trace::TracerProvider as _;
use ricebook_server::{
    build_router, validate_startup_config_contract, ApiConfig, AppState, HttpMediaStore,
    LocalFsMediaStore, MediaStoreBackend, RetryPolicy, DEV_SESSION_SECRET,
};
use ricebook_store::DocumentStore;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_json = env_bool("RICEBOOK_LOG_JSON", true);
    if env_bool("RICEBOOK_OTEL_ENABLED", false) {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()
            .expect("otlp exporter");
        let tracer = opentelemetry_sdk::trace::TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .build()
            .tracer("ricebook-server");
        if log_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
        }
    } else if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn config_from_env() -> ApiConfig {
    ApiConfig {
        bind_addr: env::var("RICEBOOK_BIND").unwrap_or_else(|_| "0.0.0.0:3001".to_string()),
        cookie_name: env::var("RICEBOOK_COOKIE_NAME").unwrap_or_else(|_| "sid".to_string()),
        cookie_secure: env_bool("RICEBOOK_COOKIE_SECURE", false),
        session_secret: env::var("RICEBOOK_SESSION_SECRET")
            .unwrap_or_else(|_| DEV_SESSION_SECRET.to_string()),
        session_ttl_secs: env_u64("RICEBOOK_SESSION_TTL_SECS", 86_400),
        session_sweep_interval_secs: env_u64("RICEBOOK_SESSION_SWEEP_INTERVAL_SECS", 60),
        cors_allowed_origins: env_list("RICEBOOK_CORS_ALLOWED_ORIGINS"),
        max_body_bytes: env_usize("RICEBOOK_MAX_BODY_BYTES", 64 * 1024),
        max_upload_bytes: env_usize("RICEBOOK_MAX_UPLOAD_BYTES", 6 * 1024 * 1024),
        max_image_bytes: env_usize("RICEBOOK_MAX_IMAGE_BYTES", 5 * 1024 * 1024),
        max_uri_bytes: env_usize("RICEBOOK_MAX_URI_BYTES", 8 * 1024),
        max_header_bytes: env_usize("RICEBOOK_MAX_HEADER_BYTES", 16 * 1024),
        auth_rate_capacity: env_f64("RICEBOOK_AUTH_RATE_CAPACITY", 10.0),
        auth_rate_refill_per_sec: env_f64("RICEBOOK_AUTH_RATE_REFILL_PER_SEC", 0.5),
        default_avatar_url: env::var("RICEBOOK_DEFAULT_AVATAR_URL")
            .unwrap_or_else(|_| "https://static.ricebook.example/avatar-default.png".to_string()),
        enable_audit_log: env_bool("RICEBOOK_AUDIT_LOG", false),
        redis_url: env::var("RICEBOOK_REDIS_URL").ok(),
        redis_prefix: env::var("RICEBOOK_REDIS_PREFIX").unwrap_or_else(|_| "ricebook".to_string()),
        enable_redis_sessions: env_bool("RICEBOOK_ENABLE_REDIS_SESSIONS", false),
        enable_redis_rate_limit: env_bool("RICEBOOK_ENABLE_REDIS_RATE_LIMIT", false),
        redis_timeout_ms: env_u64("RICEBOOK_REDIS_TIMEOUT_MS", 200),
        redis_retry_attempts: env_usize("RICEBOOK_REDIS_RETRY_ATTEMPTS", 2),
        redis_breaker_failure_threshold: env_u64("RICEBOOK_REDIS_BREAKER_FAILURE_THRESHOLD", 5)
            as u32,
        redis_breaker_open_ms: env_u64("RICEBOOK_REDIS_BREAKER_OPEN_MS", 3_000),
    }
}

fn media_backend_from_env(public_base: &str) -> Result<Arc<dyn MediaStoreBackend>, String> {
    if env_bool("RICEBOOK_MEDIA_HTTP_ENABLED", false) {
        let base_url = env::var("RICEBOOK_MEDIA_HTTP_BASE_URL")
            .map_err(|_| "RICEBOOK_MEDIA_HTTP_BASE_URL is required when HTTP media is enabled".to_string())?;
        let retry = RetryPolicy {
            max_attempts: env_usize("RICEBOOK_MEDIA_RETRY_ATTEMPTS", 4),
            base_backoff_ms: env_u64("RICEBOOK_MEDIA_RETRY_BASE_MS", 120),
        };
        return Ok(Arc::new(HttpMediaStore::new(
            base_url,
            public_base,
            env::var("RICEBOOK_MEDIA_HTTP_BEARER").ok(),
            retry,
            env_bool("RICEBOOK_MEDIA_ALLOW_PRIVATE_HOSTS", false),
        )));
    }
    let media_root = PathBuf::from(
        env::var("RICEBOOK_MEDIA_ROOT").unwrap_or_else(|_| "artifacts/media".to_string()),
    );
    std::fs::create_dir_all(&media_root)
        .map_err(|e| format!("media root create failed: {e}"))?;
    Ok(Arc::new(LocalFsMediaStore::new(media_root, public_base)))
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let api = config_from_env();
    validate_startup_config_contract(&api)?;

    let db_path = PathBuf::from(
        env::var("RICEBOOK_DB_PATH").unwrap_or_else(|_| "artifacts/ricebook.sqlite".to_string()),
    );
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("db dir create failed: {e}"))?;
    }
    let store = Arc::new(
        DocumentStore::open(&db_path).map_err(|e| format!("store open failed: {e}"))?,
    );

    // Empty base yields relative /media/... URLs, which is what a
    // same-origin SPA deployment wants.
    let public_base = env::var("RICEBOOK_PUBLIC_BASE_URL").unwrap_or_default();
    let media = media_backend_from_env(&public_base)?;

    let bind_addr = api.bind_addr.clone();
    let sweep_interval = Duration::from_secs(api.session_sweep_interval_secs);
    let state = AppState::with_config(store, media, api);
    let app = build_router(state.clone());

    state.ready.store(false, Ordering::Relaxed);
    state.sessions.spawn_sweeper(sweep_interval);
    state.ready.store(true, Ordering::Relaxed);

    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("invalid bind addr {bind_addr}: {e}"))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4().map_err(|e| format!("socket v4 failed: {e}"))?
    } else {
        tokio::net::TcpSocket::new_v6().map_err(|e| format!("socket v6 failed: {e}"))?
    };
    socket
        .set_reuseaddr(true)
        .map_err(|e| format!("set_reuseaddr failed: {e}"))?;
    socket
        .set_keepalive(env_bool("RICEBOOK_TCP_KEEPALIVE_ENABLED", true))
        .map_err(|e| format!("set_keepalive failed: {e}"))?;
    socket.bind(addr).map_err(|e| format!("bind failed: {e}"))?;
    let listener: TcpListener = socket
        .listen(1024)
        .map_err(|e| format!("listen failed: {e}"))?;
    info!("ricebook-server listening on {bind_addr}");
    let accepting = state.accepting_requests.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            accepting.store(false, Ordering::Relaxed);
            // Readiness fails first so the load balancer stops routing
            // here, then in-flight requests get the drain window.
            let drain_ms = env_u64("RICEBOOK_SHUTDOWN_DRAIN_MS", 5000);
            tokio::time::sleep(Duration::from_millis(drain_ms)).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
