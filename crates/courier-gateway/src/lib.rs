//! # courier-gateway
//!
//! Sharded gateway session runtime: per-shard connection state machines, heartbeating,
//! resume, and identify coordination across shards.

pub mod cluster;
pub mod codec;
pub mod coordinator;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod resume;
pub mod session;
pub mod shard;
pub mod sink;
pub mod state;
pub mod transport;

pub use cluster::{ClusterPlan, ShardCluster, ShardClusterBuilder};
pub use codec::{FrameCodec, JsonCodec};
pub use coordinator::{IdentifyCoordinator, LocalIdentifyCoordinator, UnlimitedIdentifyCoordinator};
pub use error::{CodecError, GatewayError, GatewayResult, TransportError};
pub use heartbeat::{Heartbeat, HeartbeatTick};
pub use protocol::{CloseCode, GatewayMessage, OpCode};
pub use resume::{FileResumeStore, MemoryResumeStore, ResumeStore};
pub use session::{SequenceCheck, SessionData, SessionSnapshot, ShardInfo};
pub use shard::{Shard, ShardBuilder, ShardConfig, ShardHandle};
pub use sink::{ChannelSink, ConnectivityChange, EventSink, GatewayEvent, ShardEvent, TracingSink};
pub use state::{HandshakeKind, InvalidTransition, SessionInput, SessionState};

use courier_common::ClientConfig;
use courier_http::RestClient;
use std::sync::Arc;
use tracing::info;
use transport::WsTransport;

/// Run every configured shard until Ctrl+C
pub async fn run(config: ClientConfig) -> GatewayResult<()> {
    let rest = RestClient::from_config(&config.http).map_err(|e| GatewayError::Config(e.to_string()))?;
    let plan = ClusterPlan::fetch(&rest, &config.gateway).await?;

    info!(
        url = %plan.url,
        shard_count = plan.shard_count,
        first_shard = plan.shard_ids.start,
        last_shard = plan.shard_ids.end - 1,
        "Gateway plan resolved"
    );

    let shard_config = Arc::new(ShardConfig::from_config(
        &config.gateway,
        config.http.token.clone(),
        plan.url.clone(),
    ));
    let coordinator = Arc::new(LocalIdentifyCoordinator::new(
        plan.max_concurrency,
        config.gateway.identify_interval(),
    )?);
    let store: Arc<dyn ResumeStore> = match &config.gateway.resume_store_path {
        Some(path) => Arc::new(FileResumeStore::new(path)),
        None => Arc::new(MemoryResumeStore::new()),
    };

    let cluster = ShardCluster::builder(plan, shard_config, Arc::new(WsTransport))
        .coordinator(coordinator)
        .sink(Arc::new(TracingSink))
        .store(store)
        .start()
        .await?;

    cluster.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
