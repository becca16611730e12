//! Event sinks
//!
//! A sink is called from the shard task, in arrival order, so it must not block. Slow
//! consumers should hand events off, as `ChannelSink` does.

use crate::session::ShardInfo;
use crate::state::SessionState;
use serde_json::Value;
use tokio::sync::mpsc;

/// A dispatch received by a shard
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub shard: ShardInfo,
    /// Event name (`t`)
    pub name: String,
    pub sequence: Option<u64>,
    pub payload: Value,
}

/// A shard changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityChange {
    pub shard: ShardInfo,
    pub previous: SessionState,
    pub current: SessionState,
}

/// Receives what shards produce
pub trait EventSink: Send + Sync + 'static {
    fn on_event(&self, event: GatewayEvent);

    fn on_connectivity_change(&self, change: ConnectivityChange) {
        let _ = change;
    }
}

/// Either kind of sink notification
#[derive(Debug, Clone, PartialEq)]
pub enum ShardEvent {
    Dispatch(GatewayEvent),
    Connectivity(ConnectivityChange),
}

/// Forwards everything into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ShardEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ShardEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: GatewayEvent) {
        if self.tx.send(ShardEvent::Dispatch(event)).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }

    fn on_connectivity_change(&self, change: ConnectivityChange) {
        let _ = self.tx.send(ShardEvent::Connectivity(change));
    }
}

/// Logs events instead of delivering them
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: GatewayEvent) {
        tracing::info!(
            shard_id = event.shard.id,
            event = %event.name,
            sequence = event.sequence,
            "Gateway event"
        );
    }

    fn on_connectivity_change(&self, change: ConnectivityChange) {
        tracing::info!(
            shard_id = change.shard.id,
            from = %change.previous,
            to = %change.current,
            "Shard connectivity changed"
        );
    }
}
