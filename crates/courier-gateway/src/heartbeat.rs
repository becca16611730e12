//! Heartbeat timer
//!
//! Pure bookkeeping: the shard loop sleeps until `next_beat()` and calls `tick()`, which
//! either asks for a heartbeat to be sent or reports a zombie connection.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Longest heartbeat interval a Hello may ask for
pub const MAX_INTERVAL: Duration = Duration::from_secs(3_600);

/// Interval announced by a Hello, or `None` when it is zero or above `MAX_INTERVAL`
#[must_use]
pub fn interval_from_millis(millis: u64) -> Option<Duration> {
    let interval = Duration::from_millis(millis);
    (!interval.is_zero() && interval <= MAX_INTERVAL).then_some(interval)
}

/// Outcome of a heartbeat tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Send a heartbeat now
    Send,
    /// Too many heartbeats went unacknowledged
    Zombie { missed: u32 },
}

/// Heartbeat state of one connection
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    jitter: Duration,
    max_missed: u32,
    next_beat: Instant,
    last_sent: Option<Instant>,
    awaiting_ack: bool,
    missed: u32,
    latency: Option<Duration>,
}

impl Heartbeat {
    /// Start the timer; the first beat is due one interval (plus jitter) after `now`
    #[must_use]
    pub fn new(interval: Duration, jitter: Duration, max_missed: u32, now: Instant) -> Self {
        let mut heartbeat = Self {
            interval: interval.min(MAX_INTERVAL),
            jitter: jitter.min(MAX_INTERVAL),
            max_missed: max_missed.max(1),
            next_beat: now,
            last_sent: None,
            awaiting_ack: false,
            missed: 0,
            latency: None,
        };
        heartbeat.next_beat = heartbeat.due_after(now);
        heartbeat
    }

    fn due_after(&self, now: Instant) -> Instant {
        let period = self.period();
        now.checked_add(period).unwrap_or(now + MAX_INTERVAL)
    }

    fn period(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// When the next beat is due
    #[must_use]
    pub fn next_beat(&self) -> Instant {
        self.next_beat
    }

    /// Called when the timer fires
    pub fn tick(&mut self, now: Instant) -> HeartbeatTick {
        if self.awaiting_ack {
            self.missed += 1;
            if self.missed >= self.max_missed {
                return HeartbeatTick::Zombie { missed: self.missed };
            }
        }

        self.awaiting_ack = true;
        self.last_sent = Some(now);
        self.next_beat = self.due_after(now);
        HeartbeatTick::Send
    }

    /// Record an ack; returns the round trip of the last beat
    pub fn acknowledge(&mut self, now: Instant) -> Option<Duration> {
        if self.awaiting_ack {
            self.latency = self.last_sent.map(|sent| now.saturating_duration_since(sent));
        }
        self.awaiting_ack = false;
        self.missed = 0;
        self.latency
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Round trip of the last acknowledged beat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    #[must_use]
    pub fn missed(&self) -> u32 {
        self.missed
    }

    #[must_use]
    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    #[must_use]
    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }
}
