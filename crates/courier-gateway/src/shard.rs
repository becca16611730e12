//! Gateway session manager
//!
//! One `Shard` drives one gateway connection at a time through the session state
//! machine: connect, Hello, Identify or Resume, then heartbeats and dispatches until the
//! connection drops, after which it backs off and reconnects. Everything runs on the
//! shard's own task; the `ShardHandle` talks to it over channels.

use crate::codec::{FrameCodec, JsonCodec};
use crate::coordinator::{IdentifyCoordinator, UnlimitedIdentifyCoordinator};
use crate::error::{GatewayError, GatewayResult, TransportError};
use crate::heartbeat::{self, Heartbeat, HeartbeatTick};
use crate::protocol::{
    CloseCode, ConnectionProperties, GatewayMessage, IdentifyPayload, OpCode,
    PresenceUpdatePayload, ResumePayload, NORMAL_CLOSE, RESUMABLE_CLOSE,
};
use crate::session::{SequenceCheck, SessionData, SessionSnapshot, ShardInfo};
use crate::sink::{ConnectivityChange, EventSink, GatewayEvent, TracingSink};
use crate::state::{InvalidTransition, SessionInput, SessionState};
use crate::transport::{CloseFrame, Frame, GatewayConnection, GatewayTransport, TransportEvent};
use courier_common::{Backoff, BackoffConfig, GatewayConfig};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Settings shared by all shards of a process
#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub token: String,
    /// Gateway base URL, without query
    pub url: String,
    pub api_version: u8,
    pub intents: u64,
    pub large_threshold: u16,
    pub properties: ConnectionProperties,
    pub presence: Option<PresenceUpdatePayload>,
    pub connect_timeout: Duration,
    pub heartbeat_jitter: Duration,
    pub max_missed_heartbeat_acks: u32,
    pub malformed_event_threshold: u32,
    pub reconnect_backoff: BackoffConfig,
}

impl ShardConfig {
    pub fn new(token: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            url: url.into(),
            api_version: 10,
            intents: 0,
            large_threshold: 50,
            properties: ConnectionProperties::default(),
            presence: None,
            connect_timeout: Duration::from_secs(10),
            heartbeat_jitter: Duration::from_millis(500),
            max_missed_heartbeat_acks: 2,
            malformed_event_threshold: 10,
            reconnect_backoff: BackoffConfig::default(),
        }
    }

    /// Settings from the gateway configuration section
    pub fn from_config(config: &GatewayConfig, token: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            api_version: config.api_version,
            intents: config.intents,
            large_threshold: config.large_threshold,
            connect_timeout: config.connect_timeout(),
            heartbeat_jitter: config.heartbeat_jitter(),
            max_missed_heartbeat_acks: config.max_missed_heartbeat_acks,
            malformed_event_threshold: config.malformed_event_threshold,
            reconnect_backoff: config.reconnect_backoff,
            ..Self::new(token, url)
        }
    }

    /// Connection URL for a base URL
    #[must_use]
    pub fn connect_url(&self, base: &str) -> String {
        format!(
            "{}/?v={}&encoding=json",
            base.trim_end_matches('/'),
            self.api_version
        )
    }

    fn authorization(&self) -> String {
        let token = self.token.trim();
        if token.starts_with("Bot ") {
            token.to_string()
        } else {
            format!("Bot {token}")
        }
    }
}

/// Why a connection ended
#[derive(Debug)]
enum Disconnect {
    Shutdown,
    Reconnect(SessionInput),
    Fatal(GatewayError),
}

impl From<InvalidTransition> for Disconnect {
    fn from(e: InvalidTransition) -> Self {
        Self::Fatal(e.into())
    }
}

/// What woke the connection loop
enum Wake {
    Shutdown,
    Heartbeat,
    HelloTimeout,
    IdentifySlot(GatewayResult<()>),
    Command(GatewayMessage),
    Inbound(Option<Result<TransportEvent, TransportError>>),
}

type IdentifySlot = Pin<Box<dyn Future<Output = GatewayResult<()>> + Send>>;

/// Per-connection state, dropped with the connection
struct ConnectionContext {
    heartbeat: Option<Heartbeat>,
    identify_slot: Option<IdentifySlot>,
    hello_deadline: Instant,
    malformed: u32,
}

/// Control surface of a running shard
#[derive(Debug, Clone)]
pub struct ShardHandle {
    info: ShardInfo,
    state: watch::Receiver<SessionState>,
    shutdown: Arc<watch::Sender<bool>>,
    commands: mpsc::UnboundedSender<GatewayMessage>,
}

impl ShardHandle {
    #[must_use]
    pub fn info(&self) -> ShardInfo {
        self.info
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the shard reaches `target`; false if it stopped first
    pub async fn wait_for_state(&self, target: SessionState) -> bool {
        let mut state = self.state.clone();
        let reached = state.wait_for(|current| *current == target).await.is_ok();
        reached
    }

    /// Queue a message; it goes out once the shard is connected
    pub fn send(&self, message: GatewayMessage) -> GatewayResult<()> {
        self.commands
            .send(message)
            .map_err(|_| GatewayError::ShardStopped(self.info.id))
    }

    /// Ask the shard to stop; `Shard::run` then returns its final snapshot
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Builder for `Shard`
pub struct ShardBuilder<T: GatewayTransport> {
    info: ShardInfo,
    config: Arc<ShardConfig>,
    transport: T,
    codec: Arc<dyn FrameCodec>,
    coordinator: Arc<dyn IdentifyCoordinator>,
    sink: Arc<dyn EventSink>,
    snapshot: Option<SessionSnapshot>,
}

impl<T: GatewayTransport> ShardBuilder<T> {
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn coordinator(mut self, coordinator: Arc<dyn IdentifyCoordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Resume this session on the first connection
    #[must_use]
    pub fn snapshot(mut self, snapshot: Option<SessionSnapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    #[must_use]
    pub fn build(self) -> (Shard<T>, ShardHandle) {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let session = self
            .snapshot
            .map(SessionData::from_snapshot)
            .unwrap_or_default();

        let shard = Shard {
            info: self.info,
            backoff: Backoff::new(self.config.reconnect_backoff),
            config: self.config,
            transport: self.transport,
            codec: self.codec,
            coordinator: self.coordinator,
            sink: self.sink,
            session,
            state: SessionState::Disconnected,
            state_tx,
            shutdown: shutdown_rx,
            commands: commands_rx,
        };

        let handle = ShardHandle {
            info: self.info,
            state: state_rx,
            shutdown: Arc::new(shutdown_tx),
            commands: commands_tx,
        };

        (shard, handle)
    }
}

/// Session manager of one shard
pub struct Shard<T: GatewayTransport> {
    info: ShardInfo,
    config: Arc<ShardConfig>,
    transport: T,
    codec: Arc<dyn FrameCodec>,
    coordinator: Arc<dyn IdentifyCoordinator>,
    sink: Arc<dyn EventSink>,
    session: SessionData,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    shutdown: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<GatewayMessage>,
    backoff: Backoff,
}

impl<T: GatewayTransport> Shard<T> {
    pub fn builder(info: ShardInfo, config: Arc<ShardConfig>, transport: T) -> ShardBuilder<T> {
        ShardBuilder {
            info,
            config,
            transport,
            codec: Arc::new(JsonCodec),
            coordinator: Arc::new(UnlimitedIdentifyCoordinator),
            sink: Arc::new(TracingSink),
            snapshot: None,
        }
    }

    #[must_use]
    pub fn info(&self) -> ShardInfo {
        self.info
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until shut down or a fatal close
    ///
    /// Returns the resumable session, if any, so a later process can resume it.
    pub async fn run(mut self) -> GatewayResult<Option<SessionSnapshot>> {
        tracing::info!(shard_id = self.info.id, shard_count = self.info.total, "Shard starting");
        self.apply(SessionInput::Start)?;

        loop {
            match self.run_connection().await {
                Disconnect::Shutdown => break,
                Disconnect::Fatal(error) => {
                    tracing::error!(
                        shard_id = self.info.id,
                        error = %error,
                        error_code = error.error_code(),
                        "Shard stopped on fatal error"
                    );
                    self.apply(SessionInput::Fatal)?;
                    return Err(error);
                }
                Disconnect::Reconnect(input) => {
                    self.apply(input)?;

                    let delay = self.backoff.next_delay();
                    tracing::info!(
                        shard_id = self.info.id,
                        reason = ?input,
                        attempt = self.backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        resumable = self.session.can_resume(),
                        "Reconnecting after backoff"
                    );

                    let elapsed = tokio::select! {
                        biased;
                        () = wait_for_shutdown(&mut self.shutdown) => false,
                        () = tokio::time::sleep(delay) => true,
                    };
                    if !elapsed {
                        break;
                    }
                    self.apply(SessionInput::BackoffElapsed)?;
                }
            }
        }

        self.apply(SessionInput::Stop)?;
        tracing::info!(shard_id = self.info.id, "Shard stopped");
        Ok(self.session.snapshot())
    }

    fn apply(&mut self, input: SessionInput) -> Result<(), InvalidTransition> {
        let previous = self.state;
        let current = previous.on(input)?;

        self.state = current;
        self.state_tx.send_replace(current);

        tracing::debug!(
            shard_id = self.info.id,
            from = %previous,
            to = %current,
            input = ?input,
            "Session state changed"
        );
        self.sink.on_connectivity_change(ConnectivityChange {
            shard: self.info,
            previous,
            current,
        });

        Ok(())
    }

    fn connect_url(&self) -> String {
        let base = if self.session.can_resume() {
            self.session.resume_url().unwrap_or(self.config.url.as_str())
        } else {
            self.config.url.as_str()
        };
        self.config.connect_url(base)
    }

    async fn run_connection(&mut self) -> Disconnect {
        let url = self.connect_url();
        tracing::info!(
            shard_id = self.info.id,
            url = %url,
            resuming = self.session.can_resume(),
            "Connecting to gateway"
        );

        let connect = tokio::time::timeout(self.config.connect_timeout, self.transport.connect(&url));
        let mut conn = tokio::select! {
            biased;
            () = wait_for_shutdown(&mut self.shutdown) => return Disconnect::Shutdown,
            result = connect => match result {
                Ok(Ok(conn)) => conn,
                Ok(Err(error)) => {
                    tracing::warn!(shard_id = self.info.id, error = %error, "Failed to connect");
                    return Disconnect::Reconnect(SessionInput::ConnectionLost);
                }
                Err(_) => {
                    tracing::warn!(
                        shard_id = self.info.id,
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "Connect timed out"
                    );
                    return Disconnect::Reconnect(SessionInput::ConnectionLost);
                }
            },
        };

        let mut ctx = ConnectionContext {
            heartbeat: None,
            identify_slot: None,
            hello_deadline: Instant::now() + self.config.connect_timeout,
            malformed: 0,
        };

        loop {
            let next_beat = ctx.heartbeat.as_ref().map(Heartbeat::next_beat);
            let awaiting_hello = self.state == SessionState::Connecting;
            let connected = self.state.is_connected();

            let wake = tokio::select! {
                biased;
                () = wait_for_shutdown(&mut self.shutdown) => Wake::Shutdown,
                () = sleep_until_opt(next_beat) => Wake::Heartbeat,
                () = tokio::time::sleep_until(ctx.hello_deadline), if awaiting_hello => Wake::HelloTimeout,
                granted = poll_slot(&mut ctx.identify_slot) => Wake::IdentifySlot(granted),
                Some(message) = self.commands.recv(), if connected => Wake::Command(message),
                event = conn.receive() => Wake::Inbound(event),
            };

            let outcome = match wake {
                Wake::Shutdown => {
                    let code = if self.session.can_resume() {
                        RESUMABLE_CLOSE
                    } else {
                        NORMAL_CLOSE
                    };
                    close_quietly(&mut conn, code, "shutting down", self.info.id).await;
                    Some(Disconnect::Shutdown)
                }
                Wake::Heartbeat => self.beat(&mut conn, &mut ctx).await,
                Wake::HelloTimeout => {
                    tracing::warn!(shard_id = self.info.id, "No Hello received");
                    close_quietly(&mut conn, RESUMABLE_CLOSE, "no hello", self.info.id).await;
                    Some(Disconnect::Reconnect(SessionInput::ConnectionLost))
                }
                Wake::IdentifySlot(granted) => {
                    ctx.identify_slot = None;
                    match granted {
                        Ok(()) => self.identify(&mut conn).await,
                        Err(error) => {
                            tracing::warn!(shard_id = self.info.id, error = %error, "Identify slot not granted");
                            close_quietly(&mut conn, NORMAL_CLOSE, "identify unavailable", self.info.id).await;
                            Some(Disconnect::Reconnect(SessionInput::ConnectionLost))
                        }
                    }
                }
                Wake::Command(message) => {
                    tracing::trace!(shard_id = self.info.id, op = %message.op, "Sending queued command");
                    self.send(&mut conn, &message).await
                }
                Wake::Inbound(None) => {
                    tracing::info!(shard_id = self.info.id, "Connection ended without close frame");
                    Some(Disconnect::Reconnect(SessionInput::ConnectionLost))
                }
                Wake::Inbound(Some(Err(error))) => {
                    tracing::warn!(shard_id = self.info.id, error = %error, "Connection error");
                    Some(Disconnect::Reconnect(SessionInput::ConnectionLost))
                }
                Wake::Inbound(Some(Ok(TransportEvent::Close(frame)))) => Some(self.on_close(frame)),
                Wake::Inbound(Some(Ok(TransportEvent::Frame(frame)))) => {
                    self.on_frame(&mut conn, &mut ctx, &frame).await
                }
            };

            if let Some(disconnect) = outcome {
                return disconnect;
            }
        }
    }

    async fn beat(&mut self, conn: &mut T::Connection, ctx: &mut ConnectionContext) -> Option<Disconnect> {
        let heartbeat = ctx.heartbeat.as_mut()?;

        match heartbeat.tick(Instant::now()) {
            HeartbeatTick::Send => {
                tracing::trace!(shard_id = self.info.id, sequence = self.session.sequence(), "Sending heartbeat");
                self.send(conn, &GatewayMessage::heartbeat(self.session.sequence())).await
            }
            HeartbeatTick::Zombie { missed } => {
                tracing::warn!(
                    shard_id = self.info.id,
                    missed,
                    interval_ms = heartbeat.interval().as_millis() as u64,
                    "Heartbeat not acknowledged, connection zombied"
                );
                close_quietly(conn, RESUMABLE_CLOSE, "zombie connection", self.info.id).await;
                Some(Disconnect::Reconnect(SessionInput::ZombieDetected))
            }
        }
    }

    async fn send(&mut self, conn: &mut T::Connection, message: &GatewayMessage) -> Option<Disconnect> {
        let frame = match self.codec.encode(message) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::error!(shard_id = self.info.id, op = %message.op, error = %error, "Failed to encode message");
                return None;
            }
        };

        if let Err(error) = conn.send(frame).await {
            tracing::warn!(shard_id = self.info.id, op = %message.op, error = %error, "Failed to send message");
            return Some(Disconnect::Reconnect(SessionInput::ConnectionLost));
        }
        None
    }

    async fn identify(&mut self, conn: &mut T::Connection) -> Option<Disconnect> {
        let payload = IdentifyPayload {
            token: self.config.authorization(),
            properties: self.config.properties.clone(),
            intents: self.config.intents,
            shard: self.info.as_array(),
            large_threshold: self.config.large_threshold,
            presence: self.config.presence.clone(),
        };

        tracing::info!(shard_id = self.info.id, "Identifying");
        self.send(conn, &GatewayMessage::identify(&payload)).await
    }

    async fn resume(&mut self, conn: &mut T::Connection) -> Option<Disconnect> {
        let (Some(session_id), Some(seq)) = (self.session.session_id(), self.session.sequence()) else {
            return Some(Disconnect::Reconnect(SessionInput::SessionInvalidated));
        };

        let payload = ResumePayload {
            token: self.config.authorization(),
            session_id: session_id.to_string(),
            seq,
        };

        tracing::info!(shard_id = self.info.id, session_id = %payload.session_id, sequence = seq, "Resuming session");
        self.send(conn, &GatewayMessage::resume(&payload)).await
    }

    fn on_close(&mut self, frame: Option<CloseFrame>) -> Disconnect {
        let Some(frame) = frame else {
            tracing::info!(shard_id = self.info.id, "Connection closed without code");
            return Disconnect::Reconnect(SessionInput::ConnectionLost);
        };

        match CloseCode::from_u16(frame.code) {
            Some(code) if code.is_fatal() => {
                Disconnect::Fatal(GatewayError::from_close(self.info.id, code, frame.reason))
            }
            Some(code) => {
                let resumable = code.can_resume();
                tracing::warn!(
                    shard_id = self.info.id,
                    code = frame.code,
                    reason = %frame.reason,
                    resumable,
                    "Gateway closed connection"
                );
                if resumable {
                    Disconnect::Reconnect(SessionInput::ConnectionLost)
                } else {
                    self.session.clear();
                    Disconnect::Reconnect(SessionInput::SessionInvalidated)
                }
            }
            None => {
                tracing::info!(shard_id = self.info.id, code = frame.code, reason = %frame.reason, "Connection closed");
                Disconnect::Reconnect(SessionInput::ConnectionLost)
            }
        }
    }

    async fn on_frame(
        &mut self,
        conn: &mut T::Connection,
        ctx: &mut ConnectionContext,
        frame: &Frame,
    ) -> Option<Disconnect> {
        let message = match self.codec.decode(frame) {
            Ok(message) => message,
            Err(error) => return self.on_malformed(conn, ctx, &error.to_string()).await,
        };

        match message.op {
            OpCode::Dispatch => self.on_dispatch(message),
            OpCode::Hello => self.on_hello(conn, ctx, &message).await,
            OpCode::Heartbeat => {
                tracing::debug!(shard_id = self.info.id, "Heartbeat requested by server");
                self.send(conn, &GatewayMessage::heartbeat(self.session.sequence())).await
            }
            OpCode::HeartbeatAck => {
                if let Some(heartbeat) = ctx.heartbeat.as_mut() {
                    let latency = heartbeat.acknowledge(Instant::now());
                    tracing::trace!(
                        shard_id = self.info.id,
                        latency_ms = latency.map(|l| l.as_millis() as u64),
                        "Heartbeat acknowledged"
                    );
                }
                None
            }
            OpCode::Reconnect => {
                tracing::info!(shard_id = self.info.id, "Server requested reconnect");
                close_quietly(conn, RESUMABLE_CLOSE, "reconnect requested", self.info.id).await;
                Some(Disconnect::Reconnect(SessionInput::ReconnectRequested))
            }
            OpCode::InvalidSession => {
                let resumable = message.invalid_session_resumable().unwrap_or(false);
                tracing::warn!(shard_id = self.info.id, resumable, "Session invalidated");

                let code = if resumable {
                    RESUMABLE_CLOSE
                } else {
                    self.session.clear();
                    NORMAL_CLOSE
                };
                close_quietly(conn, code, "session invalidated", self.info.id).await;
                Some(Disconnect::Reconnect(SessionInput::SessionInvalidated))
            }
            op => {
                tracing::debug!(shard_id = self.info.id, op = %op, "Ignoring unexpected op code");
                None
            }
        }
    }

    async fn on_malformed(
        &mut self,
        conn: &mut T::Connection,
        ctx: &mut ConnectionContext,
        error: &str,
    ) -> Option<Disconnect> {
        ctx.malformed += 1;
        tracing::warn!(
            shard_id = self.info.id,
            error = %error,
            malformed = ctx.malformed,
            threshold = self.config.malformed_event_threshold,
            "Dropping malformed frame"
        );

        if ctx.malformed > self.config.malformed_event_threshold {
            close_quietly(conn, RESUMABLE_CLOSE, "too many malformed frames", self.info.id).await;
            return Some(Disconnect::Reconnect(SessionInput::MalformedThreshold));
        }
        None
    }

    async fn on_hello(
        &mut self,
        conn: &mut T::Connection,
        ctx: &mut ConnectionContext,
        message: &GatewayMessage,
    ) -> Option<Disconnect> {
        if self.state != SessionState::Connecting {
            tracing::debug!(shard_id = self.info.id, "Ignoring repeated Hello");
            return None;
        }

        let Some(hello) = message.as_hello() else {
            return self.on_malformed(conn, ctx, "Hello without heartbeat interval").await;
        };

        let Some(interval) = heartbeat::interval_from_millis(hello.heartbeat_interval) else {
            // Left waiting for a usable Hello until the deadline reconnects
            return self.on_malformed(conn, ctx, "Hello with unusable heartbeat interval").await;
        };
        ctx.heartbeat = Some(Heartbeat::new(
            interval,
            self.config.heartbeat_jitter,
            self.config.max_missed_heartbeat_acks,
            Instant::now(),
        ));
        tracing::debug!(
            shard_id = self.info.id,
            heartbeat_interval_ms = hello.heartbeat_interval,
            "Hello received"
        );

        let can_resume = self.session.can_resume();
        if let Err(e) = self.apply(SessionInput::HelloReceived { can_resume }) {
            return Some(e.into());
        }

        if can_resume {
            return self.resume(conn).await;
        }

        // A fresh session numbers its dispatches from the start again
        self.session.clear();
        let coordinator = Arc::clone(&self.coordinator);
        let shard_id = self.info.id;
        ctx.identify_slot = Some(Box::pin(async move {
            coordinator.acquire_identify_slot(shard_id).await
        }));
        tracing::debug!(shard_id, "Waiting for identify slot");
        None
    }

    fn on_dispatch(&mut self, message: GatewayMessage) -> Option<Disconnect> {
        let name = message.t.clone().unwrap_or_default();

        if let Some(sequence) = message.s {
            match self.session.record_sequence(sequence) {
                SequenceCheck::Duplicate { last } => {
                    tracing::debug!(shard_id = self.info.id, sequence, last, event = %name, "Dropping replayed dispatch");
                    return None;
                }
                SequenceCheck::Gap { expected } => {
                    tracing::warn!(shard_id = self.info.id, sequence, expected, event = %name, "Sequence gap");
                }
                SequenceCheck::InOrder => {}
            }
        }

        let acknowledged = match name.as_str() {
            "READY" => match message.as_ready() {
                Some(ready) => {
                    tracing::info!(shard_id = self.info.id, session_id = %ready.session_id, "Session ready");
                    self.session.start(ready.session_id, ready.resume_gateway_url);
                    true
                }
                None => {
                    tracing::warn!(shard_id = self.info.id, "READY without session id");
                    false
                }
            },
            "RESUMED" => {
                tracing::info!(shard_id = self.info.id, sequence = self.session.sequence(), "Session resumed");
                true
            }
            _ => false,
        };

        if acknowledged && matches!(self.state, SessionState::Handshaking(_)) {
            if let Err(e) = self.apply(SessionInput::HandshakeAcknowledged) {
                return Some(e.into());
            }
            self.backoff.reset();
        }

        self.sink.on_event(GatewayEvent {
            shard: self.info,
            name,
            sequence: message.s,
            payload: message.d.unwrap_or_default(),
        });
        None
    }
}

/// Resolves when shutdown is requested; pending forever if the handle is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn poll_slot(slot: &mut Option<IdentifySlot>) -> GatewayResult<()> {
    match slot {
        Some(pending) => pending.await,
        None => std::future::pending().await,
    }
}

async fn close_quietly<C: GatewayConnection>(conn: &mut C, code: u16, reason: &str, shard_id: u32) {
    if let Err(error) = conn.close(code, reason).await {
        tracing::debug!(shard_id, code, error = %error, "Close failed");
    }
}
