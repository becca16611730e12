//! Quota fields carried by responses

use crate::request::HttpResponse;
use serde::Deserialize;
use std::time::Duration;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const BUCKET: &str = "x-ratelimit-bucket";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const SCOPE: &str = "x-ratelimit-scope";
pub const RETRY_AFTER: &str = "retry-after";

/// Scope of a 429
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Per-route quota of this client
    User,
    /// Process-wide quota of this client
    Global,
    /// Quota shared with other clients on the same resource
    Shared,
}

impl RateLimitScope {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "global" => Some(Self::Global),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }
}

/// Quota fields of one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Relative time until the bucket refills
    pub reset_after: Option<Duration>,
    /// Server-assigned bucket id
    pub bucket: Option<String>,
    pub global: bool,
    pub scope: Option<RateLimitScope>,
}

impl RateLimitHeaders {
    #[must_use]
    pub fn parse(response: &HttpResponse) -> Self {
        Self {
            limit: response.header(LIMIT).and_then(|v| v.trim().parse().ok()),
            remaining: response.header(REMAINING).and_then(|v| v.trim().parse().ok()),
            reset_after: response.header(RESET_AFTER).and_then(parse_seconds),
            bucket: response
                .header(BUCKET)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string),
            global: response
                .header(GLOBAL)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            scope: response.header(SCOPE).and_then(RateLimitScope::parse),
        }
    }

    /// Whether the response refreshes remaining/reset accounting
    #[must_use]
    pub fn has_quota(&self) -> bool {
        self.remaining.is_some() && self.reset_after.is_some()
    }
}

/// Retry instructions of a 429 response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryAfter {
    /// `None` when the server gave no usable delay
    pub delay: Option<Duration>,
    pub global: bool,
}

#[derive(Deserialize)]
struct RateLimitedBody {
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

impl RetryAfter {
    /// Body `retry_after` wins, then the `Retry-After` header, then the bucket reset
    #[must_use]
    pub fn parse(response: &HttpResponse, headers: &RateLimitHeaders) -> Self {
        let body: Option<RateLimitedBody> = serde_json::from_slice(&response.body).ok();

        let delay = body
            .as_ref()
            .and_then(|b| b.retry_after)
            .and_then(seconds_to_duration)
            .or_else(|| response.header(RETRY_AFTER).and_then(parse_seconds))
            .or(headers.reset_after);

        let global = headers.global
            || body.is_some_and(|b| b.global)
            || headers.scope == Some(RateLimitScope::Global);

        Self { delay, global }
    }
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    raw.trim().parse::<f64>().ok().and_then(seconds_to_duration)
}

fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}
