//! Canned responses, configs and gateway messages

use courier_common::BackoffConfig;
use courier_gateway::ShardConfig;
use courier_http::{DispatcherConfig, HttpResponse, Method, Request, Route};
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the label a test gives each request
pub const TAG_HEADER: &str = "x-test-tag";

/// A request labelled with `tag`
pub fn tagged(method: Method, path: &str, tag: &str) -> Request {
    Request::new(Route::new(method, path)).header(TAG_HEADER, tag)
}

pub fn ok() -> HttpResponse {
    HttpResponse::new(200).with_body(b"{}".to_vec())
}

/// 200 carrying quota fields
pub fn ok_with_quota(limit: u32, remaining: u32, reset_after: Duration) -> HttpResponse {
    ok()
        .with_header("x-ratelimit-limit", limit.to_string())
        .with_header("x-ratelimit-remaining", remaining.to_string())
        .with_header("x-ratelimit-reset-after", seconds(reset_after))
}

/// 429 for the route's own bucket
pub fn rate_limited(retry_after: Duration) -> HttpResponse {
    HttpResponse::new(429)
        .with_header("retry-after", seconds(retry_after))
        .with_header("x-ratelimit-scope", "user")
}

/// 429 for every route
pub fn globally_rate_limited(retry_after: Duration) -> HttpResponse {
    HttpResponse::new(429)
        .with_header("x-ratelimit-global", "true")
        .with_header("x-ratelimit-scope", "global")
        .with_body(format!(r#"{{"retry_after":{},"global":true}}"#, retry_after.as_secs_f64()))
}

pub fn seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// Dispatcher settings with fast, deterministic retries
pub fn dispatcher_config() -> DispatcherConfig {
    DispatcherConfig {
        request_timeout: Duration::from_secs(10),
        max_retries: 2,
        max_rate_limit_retries: 3,
        global_requests_per_second: None,
        retry_backoff: BackoffConfig::new(Duration::from_millis(50), Duration::from_secs(1)).without_jitter(),
    }
}

/// Shard settings without jitter
pub fn shard_config() -> Arc<ShardConfig> {
    Arc::new(ShardConfig {
        heartbeat_jitter: Duration::ZERO,
        reconnect_backoff: BackoffConfig::new(Duration::from_millis(100), Duration::from_secs(1)).without_jitter(),
        ..ShardConfig::new("integration-token", "memory://gateway")
    })
}
