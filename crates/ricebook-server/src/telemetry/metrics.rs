// SPDX-License-Identifier: Apache-2.0

//! In-process request metrics and the Prometheus plaintext renderer
//! behind `GET /metrics`.

use crate::AppState;
use axum::http::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub(crate) const METRIC_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Default)]
pub(crate) struct RequestMetrics {
    pub(crate) counts: Mutex<HashMap<(String, u16), u64>>,
    pub(crate) latency_ns: Mutex<HashMap<String, Vec<u64>>>,
    pub(crate) store_latency_ns: Mutex<HashMap<String, Vec<u64>>>,
    pub(crate) policy_violations_by_policy: Mutex<HashMap<String, u64>>,
    pub(crate) rate_limited_total: AtomicU64,
}

impl RequestMetrics {
    pub(crate) async fn observe_request(&self, route: &str, status: StatusCode, latency: Duration) {
        let mut counts = self.counts.lock().await;
        *counts
            .entry((route.to_string(), status.as_u16()))
            .or_insert(0) += 1;
        drop(counts);
        let mut latency_map = self.latency_ns.lock().await;
        latency_map
            .entry(route.to_string())
            .or_insert_with(Vec::new)
            .push(latency.as_nanos() as u64);
    }

    pub(crate) async fn observe_store_op(&self, op: &str, latency: Duration) {
        let mut m = self.store_latency_ns.lock().await;
        m.entry(op.to_string())
            .or_insert_with(Vec::new)
            .push(latency.as_nanos() as u64);
    }

    pub(crate) async fn record_policy_violation(&self, policy: &str) {
        let mut m = self.policy_violations_by_policy.lock().await;
        *m.entry(policy.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }
}

fn percentile_ns(values: &[u64], pct: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut v = values.to_vec();
    v.sort_unstable();
    let idx = ((v.len() as f64 - 1.0) * pct).round() as usize;
    v[idx]
}

fn push_histogram_from_samples(
    body: &mut String,
    metric_name: &str,
    base_labels: &str,
    samples_ns: &[u64],
    bounds_seconds: &[f64],
) {
    let mut count_le = vec![0_u64; bounds_seconds.len()];
    let mut sum_seconds = 0.0_f64;
    for sample in samples_ns {
        let seconds = *sample as f64 / 1_000_000_000.0;
        sum_seconds += seconds;
        for (i, bound) in bounds_seconds.iter().enumerate() {
            if seconds <= *bound {
                count_le[i] += 1;
            }
        }
    }
    for (i, bound) in bounds_seconds.iter().enumerate() {
        body.push_str(&format!(
            "{metric_name}_bucket{{{base_labels},le=\"{bound}\"}} {}\n",
            count_le[i]
        ));
    }
    body.push_str(&format!(
        "{metric_name}_bucket{{{base_labels},le=\"+Inf\"}} {}\n",
        samples_ns.len()
    ));
    body.push_str(&format!(
        "{metric_name}_sum{{{base_labels}}} {sum_seconds:.9}\n"
    ));
    body.push_str(&format!(
        "{metric_name}_count{{{base_labels}}} {}\n",
        samples_ns.len()
    ));
}

/// Renders every counter the server tracks. Output is sorted so scrapes
/// and tests see a stable ordering.
pub(crate) async fn render_prometheus(state: &AppState) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "ricebook_build_info{{version=\"{METRIC_VERSION}\"}} 1\n"
    ));

    let mut counts = state
        .metrics
        .counts
        .lock()
        .await
        .clone()
        .into_iter()
        .collect::<Vec<_>>();
    counts.sort_by(|a, b| a.0.cmp(&b.0));
    for ((route, status), count) in counts {
        body.push_str(&format!(
            "ricebook_http_requests_total{{route=\"{route}\",status=\"{status}\"}} {count}\n"
        ));
    }

    let mut latencies = state
        .metrics
        .latency_ns
        .lock()
        .await
        .clone()
        .into_iter()
        .collect::<Vec<_>>();
    latencies.sort_by(|a, b| a.0.cmp(&b.0));
    for (route, vals) in latencies {
        body.push_str(&format!(
            "ricebook_http_request_latency_p95_seconds{{route=\"{route}\"}} {:.6}\n",
            percentile_ns(&vals, 0.95) as f64 / 1_000_000_000.0
        ));
        push_histogram_from_samples(
            &mut body,
            "ricebook_http_request_duration_seconds",
            &format!("route=\"{route}\""),
            &vals,
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
        );
    }

    let mut store_ops = state
        .metrics
        .store_latency_ns
        .lock()
        .await
        .clone()
        .into_iter()
        .collect::<Vec<_>>();
    store_ops.sort_by(|a, b| a.0.cmp(&b.0));
    for (op, vals) in store_ops {
        body.push_str(&format!(
            "ricebook_store_op_latency_p95_seconds{{op=\"{op}\"}} {:.6}\n",
            percentile_ns(&vals, 0.95) as f64 / 1_000_000_000.0
        ));
    }

    let mut violations = state
        .metrics
        .policy_violations_by_policy
        .lock()
        .await
        .clone()
        .into_iter()
        .collect::<Vec<_>>();
    violations.sort_by(|a, b| a.0.cmp(&b.0));
    for (policy, count) in violations {
        body.push_str(&format!(
            "ricebook_policy_violations_total{{policy=\"{policy}\"}} {count}\n"
        ));
    }

    body.push_str(&format!(
        "ricebook_rate_limited_total {}\n",
        state.metrics.rate_limited_total.load(Ordering::Relaxed)
    ));

    let sessions = state.sessions.metrics_snapshot().await;
    body.push_str(&format!(
        "ricebook_sessions_opened_total {}\n\
ricebook_sessions_destroyed_total {}\n\
ricebook_sessions_swept_total {}\n\
ricebook_sessions_active {}\n",
        sessions.opened, sessions.destroyed, sessions.swept, sessions.active
    ));

    if let Some(redis) = &state.redis {
        let snap = redis.metrics_snapshot().await;
        body.push_str(&format!(
            "ricebook_redis_hits_total {}\n\
ricebook_redis_misses_total {}\n\
ricebook_redis_read_fallbacks_total {}\n\
ricebook_redis_write_fallbacks_total {}\n\
ricebook_redis_rate_limit_fallbacks_total {}\n\
ricebook_redis_breaker_open_total {}\n\
ricebook_redis_breaker_reject_total {}\n\
ricebook_redis_key_reject_total {}\n",
            snap.hits,
            snap.misses,
            snap.read_fallbacks,
            snap.write_fallbacks,
            snap.rate_limit_fallbacks,
            snap.breaker_open_total,
            snap.breaker_reject_total,
            snap.key_reject_total
        ));
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile_ns(&[], 0.95), 0);
    }

    #[test]
    fn percentile_picks_the_high_quantile() {
        let samples = (1..=100).collect::<Vec<u64>>();
        assert_eq!(percentile_ns(&samples, 0.95), 95);
        assert_eq!(percentile_ns(&samples, 0.0), 1);
        assert_eq!(percentile_ns(&samples, 1.0), 100);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let mut body = String::new();
        let samples = [
            5_000_000_u64,   // 5ms
            20_000_000_u64,  // 20ms
            400_000_000_u64, // 400ms
        ];
        push_histogram_from_samples(
            &mut body,
            "t_seconds",
            "route=\"/x\"",
            &samples,
            &[0.01, 0.1, 1.0],
        );
        assert!(body.contains("t_seconds_bucket{route=\"/x\",le=\"0.01\"} 1"));
        assert!(body.contains("t_seconds_bucket{route=\"/x\",le=\"0.1\"} 2"));
        assert!(body.contains("t_seconds_bucket{route=\"/x\",le=\"1\"} 3"));
        assert!(body.contains("t_seconds_bucket{route=\"/x\",le=\"+Inf\"} 3"));
        assert!(body.contains("t_seconds_count{route=\"/x\"} 3"));
    }

    #[tokio::test]
    async fn observe_request_accumulates_by_route_and_status() {
        let metrics = RequestMetrics::default();
        metrics
            .observe_request("/login", StatusCode::OK, Duration::from_millis(3))
            .await;
        metrics
            .observe_request("/login", StatusCode::OK, Duration::from_millis(5))
            .await;
        metrics
            .observe_request("/login", StatusCode::UNAUTHORIZED, Duration::from_millis(2))
            .await;
        let counts = metrics.counts.lock().await;
        assert_eq!(counts.get(&("/login".to_string(), 200)), Some(&2));
        assert_eq!(counts.get(&("/login".to_string(), 401)), Some(&1));
        drop(counts);
        let lat = metrics.latency_ns.lock().await;
        assert_eq!(lat.get("/login").map(Vec::len), Some(3));
    }
}
