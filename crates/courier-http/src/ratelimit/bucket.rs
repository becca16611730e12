//! Rate buckets
//!
//! A bucket tracks the last quota the server reported for one scope. Every bucket
//! carries its own lock, so unrelated routes never contend with each other.

use super::headers::RateLimitHeaders;
use crate::route::RouteKey;
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Responses in the same window report slightly different reset instants
const RESET_TOLERANCE: Duration = Duration::from_millis(100);

/// Identity of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl BucketKey {
    /// Scope of the process-wide quota
    #[must_use]
    pub fn global() -> Self {
        Self("global".to_string())
    }

    /// Bucket of a route whose server bucket is not known yet
    #[must_use]
    pub fn for_route(route: &RouteKey) -> Self {
        Self(format!("route:{route}"))
    }

    /// Server-assigned bucket id, scoped by the route's major parameter
    #[must_use]
    pub fn from_server(bucket_id: &str, major_parameter: Option<&str>) -> Self {
        Self(format!("{bucket_id}:{}", major_parameter.unwrap_or("-")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time view of a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub key: BucketKey,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Time until the window refills, when known and still in the future
    pub reset_in: Option<Duration>,
    /// Time until a server-imposed lockout (429) ends
    pub retry_in: Option<Duration>,
}

/// One call taken from a bucket, tied to the window it was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    epoch: u64,
}

#[derive(Debug, Default)]
struct QuotaState {
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_at: Option<Instant>,
    retry_until: Option<Instant>,
    /// Bumped whenever `remaining` starts over for a new window
    epoch: u64,
}

impl QuotaState {
    fn roll(&mut self, now: Instant) {
        if self.reset_at.is_some_and(|reset| reset <= now) {
            self.reset_at = None;
            self.remaining = self.limit;
            self.epoch += 1;
        }
        if self.retry_until.is_some_and(|until| until <= now) {
            self.retry_until = None;
        }
    }

    fn ready_at(&mut self, now: Instant) -> Option<Instant> {
        self.roll(now);

        let exhausted = match (self.remaining, self.reset_at) {
            (Some(0), Some(reset)) => Some(reset),
            _ => None,
        };

        exhausted.max(self.retry_until)
    }
}

/// Quota for one scope
#[derive(Debug)]
pub struct Bucket {
    key: BucketKey,
    /// Locally managed window length; `None` when the server drives resets
    window: Option<Duration>,
    state: Mutex<QuotaState>,
}

impl Bucket {
    /// A bucket learned from server responses
    #[must_use]
    pub fn new(key: BucketKey) -> Self {
        Self {
            key,
            window: None,
            state: Mutex::new(QuotaState::default()),
        }
    }

    /// A bucket refilled locally every `window` (the global request ceiling)
    #[must_use]
    pub fn with_window(key: BucketKey, limit: u32, window: Duration) -> Self {
        Self {
            key,
            window: Some(window),
            state: Mutex::new(QuotaState {
                limit: Some(limit),
                remaining: Some(limit),
                ..QuotaState::default()
            }),
        }
    }

    #[must_use]
    pub fn key(&self) -> &BucketKey {
        &self.key
    }

    /// When the next call may go out, or `None` if it may go out now
    #[must_use]
    pub fn ready_at(&self, now: Instant) -> Option<Instant> {
        self.state.lock().ready_at(now)
    }

    /// Take one call from the quota
    ///
    /// Returns the instant to retry at when the quota is exhausted.
    pub fn try_reserve(&self, now: Instant) -> Result<Reservation, Instant> {
        let mut state = self.state.lock();

        if let Some(at) = state.ready_at(now) {
            return Err(at);
        }

        if state.reset_at.is_none() {
            if let Some(window) = self.window {
                state.reset_at = Some(now + window);
                state.remaining = state.limit;
            }
        }

        if let Some(remaining) = state.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }

        Ok(Reservation { epoch: state.epoch })
    }

    /// Give back a reservation that the server did not count
    ///
    /// Nothing is credited once the window the call was taken from has been
    /// replaced; the new window never paid for it. Returns whether the call
    /// went back into the quota.
    pub fn refund(&self, reservation: Reservation) -> bool {
        let mut state = self.state.lock();
        if state.epoch != reservation.epoch {
            return false;
        }
        let limit = state.limit;

        if let Some(remaining) = state.remaining.as_mut() {
            *remaining = remaining.saturating_add(1).min(limit.unwrap_or(u32::MAX));
        }
        true
    }

    /// Refresh from the quota fields of a response
    pub fn update(&self, headers: &RateLimitHeaders, now: Instant) {
        let mut state = self.state.lock();

        if let Some(limit) = headers.limit {
            state.limit = Some(limit);
        }

        let (Some(remaining), Some(reset_after)) = (headers.remaining, headers.reset_after) else {
            return;
        };
        let server_reset = now + reset_after;

        match state.reset_at {
            // Same window: responses can arrive out of order, keep the lower count
            Some(held) if held > now && server_reset <= held + RESET_TOLERANCE => {
                state.remaining = Some(state.remaining.map_or(remaining, |r| r.min(remaining)));
                if server_reset > held {
                    state.reset_at = Some(server_reset);
                }
            }
            _ => {
                state.remaining = Some(remaining);
                state.reset_at = Some(server_reset);
                state.epoch += 1;
            }
        }
    }

    /// Hold every call until `until` (server-provided retry delay)
    pub fn block_until(&self, until: Instant) {
        let mut state = self.state.lock();
        state.retry_until = Some(state.retry_until.map_or(until, |held| held.max(until)));
    }

    #[must_use]
    pub fn snapshot(&self, now: Instant) -> BucketSnapshot {
        let mut state = self.state.lock();
        state.roll(now);

        BucketSnapshot {
            key: self.key.clone(),
            limit: state.limit,
            remaining: state.remaining,
            reset_in: state.reset_at.map(|at| at.saturating_duration_since(now)),
            retry_in: state.retry_until.map(|at| at.saturating_duration_since(now)),
        }
    }
}
