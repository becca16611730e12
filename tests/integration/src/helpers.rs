//! Scripted transports and gateway harness

use crate::fixtures::{ok, seconds, TAG_HEADER};
use async_trait::async_trait;
use courier_gateway::protocol::GatewayMessage;
use courier_gateway::transport::{MemoryServer, MemoryServerConnection, TransportEvent};
use courier_gateway::{ShardEvent, ShardHandle, SessionState};
use courier_http::{HttpResponse, HttpTransport, Request, TransportError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One request seen by a test transport
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub tag: String,
    pub path: String,
    pub at: Instant,
}

fn record(request: &Request) -> RecordedCall {
    let tag = request
        .headers()
        .iter()
        .find(|(name, _)| name == TAG_HEADER)
        .map(|(_, value)| value.clone())
        .unwrap_or_default();

    RecordedCall {
        tag,
        path: request.route().path().to_string(),
        at: Instant::now(),
    }
}

/// Answers each tag from its own script, then with 200
#[derive(Default)]
pub struct ScriptedHttp {
    scripts: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
    /// Time each call spends on the wire
    latency: Duration,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn script(self, tag: &str, responses: impl IntoIterator<Item = HttpResponse>) -> Self {
        self.scripts
            .lock()
            .entry(tag.to_string())
            .or_default()
            .extend(responses);
        self
    }

    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.calls.lock().iter().map(|call| call.tag.clone()).collect()
    }

    pub fn calls_for(&self, tag: &str) -> Vec<RecordedCall> {
        self.calls.lock().iter().filter(|call| call.tag == tag).cloned().collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
    async fn execute(&self, request: &Request) -> Result<HttpResponse, TransportError> {
        let call = record(request);
        let response = self
            .scripts
            .lock()
            .get_mut(&call.tag)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(ok);
        self.calls.lock().push(call);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(response)
    }
}

/// Emulates a server enforcing `limit` calls per `window` on one bucket
///
/// A call over quota is answered with 429 and counted as a violation.
pub struct QuotaServer {
    limit: u32,
    window: Duration,
    state: Mutex<QuotaWindow>,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Default)]
struct QuotaWindow {
    started: Option<Instant>,
    used: u32,
    violations: u32,
}

impl QuotaServer {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(QuotaWindow::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn violations(&self) -> u32 {
        self.state.lock().violations
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.calls.lock().iter().map(|call| call.tag.clone()).collect()
    }

    fn respond(&self, now: Instant) -> HttpResponse {
        let mut state = self.state.lock();

        // Reported resets are rounded up to whole milliseconds; tolerate that much
        let expired = state
            .started
            .is_none_or(|start| now + Duration::from_millis(1) >= start + self.window);
        if expired {
            state.started = Some(now);
            state.used = 0;
        }

        let start = state.started.unwrap_or(now);
        let reset_after = ceil_millis((start + self.window).saturating_duration_since(now));

        if state.used >= self.limit {
            state.violations += 1;
            return HttpResponse::new(429)
                .with_header("retry-after", seconds(reset_after))
                .with_header("x-ratelimit-scope", "user");
        }

        state.used += 1;
        ok()
            .with_header("x-ratelimit-limit", self.limit.to_string())
            .with_header("x-ratelimit-remaining", (self.limit - state.used).to_string())
            .with_header("x-ratelimit-reset-after", seconds(reset_after))
            .with_header("x-ratelimit-bucket", "emulated")
    }
}

fn ceil_millis(duration: Duration) -> Duration {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

#[async_trait]
impl HttpTransport for QuotaServer {
    async fn execute(&self, request: &Request) -> Result<HttpResponse, TransportError> {
        let call = record(request);
        let response = self.respond(call.at);
        self.calls.lock().push(call);
        Ok(response)
    }
}

/// Accept the next connection and say hello
pub async fn accept_with_hello(server: &mut MemoryServer, heartbeat_ms: u64) -> MemoryServerConnection {
    let conn = server.accept().await.expect("gateway transport dropped");
    conn.send(&GatewayMessage::hello(heartbeat_ms));
    conn
}

/// Read until the client closes; returns the close code, if any
pub async fn wait_for_close(conn: &mut MemoryServerConnection) -> Option<u16> {
    while let Some(event) = conn.recv().await {
        if let TransportEvent::Close(frame) = event {
            return frame.map(|frame| frame.code);
        }
    }
    None
}

/// Collect every dispatch named `name` that is already in the channel
pub fn drain_dispatches(events: &mut mpsc::UnboundedReceiver<ShardEvent>, name: &str) -> Vec<u64> {
    let mut sequences = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ShardEvent::Dispatch(event) = event {
            if event.name == name {
                sequences.extend(event.sequence);
            }
        }
    }
    sequences
}

/// Wait for `handle` to reach `state`, failing after `limit`
pub async fn expect_state(handle: &ShardHandle, state: SessionState, limit: Duration) {
    let reached = tokio::time::timeout(limit, handle.wait_for_state(state))
        .await
        .unwrap_or(false);
    assert!(reached, "shard {} never reached {state}", handle.info());
}
