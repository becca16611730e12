//! Identify coordination
//!
//! The server allows `max_concurrency` Identify handshakes per identify window; shards
//! are bucketed by `shard_id % max_concurrency` and each bucket may identify once per
//! window. A shard waiting for its slot keeps heartbeating.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Grants Identify slots
#[async_trait]
pub trait IdentifyCoordinator: Send + Sync + 'static {
    /// Suspend until `shard_id` may send Identify
    async fn acquire_identify_slot(&self, shard_id: u32) -> GatewayResult<()>;
}

/// In-process coordinator backed by a keyed GCRA limiter
///
/// Uses a monotonic clock; a slot is released when its window elapses. A remote
/// coordinator can be chained to serialize identifies across processes too.
pub struct LocalIdentifyCoordinator {
    limiter: DefaultKeyedRateLimiter<u32>,
    max_concurrency: u32,
    interval: Duration,
    remote: Option<Arc<dyn IdentifyCoordinator>>,
}

impl LocalIdentifyCoordinator {
    pub fn new(max_concurrency: u32, interval: Duration) -> GatewayResult<Self> {
        let max_concurrency = max_concurrency.max(1);
        let quota = Quota::with_period(interval)
            .ok_or_else(|| GatewayError::Config("identify interval must be non-zero".to_string()))?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            max_concurrency,
            interval,
            remote: None,
        })
    }

    /// Also wait on `remote` after the local slot is granted
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn IdentifyCoordinator>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Concurrency bucket of a shard
    #[must_use]
    pub fn bucket(&self, shard_id: u32) -> u32 {
        shard_id % self.max_concurrency
    }

    #[must_use]
    pub fn max_concurrency(&self) -> u32 {
        self.max_concurrency
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl IdentifyCoordinator for LocalIdentifyCoordinator {
    async fn acquire_identify_slot(&self, shard_id: u32) -> GatewayResult<()> {
        let bucket = self.bucket(shard_id);

        if self.limiter.check_key(&bucket).is_err() {
            tracing::debug!(shard_id, bucket, "Waiting for identify slot");
            self.limiter.until_key_ready(&bucket).await;
        }

        if let Some(remote) = &self.remote {
            remote.acquire_identify_slot(shard_id).await?;
        }

        tracing::debug!(shard_id, bucket, "Identify slot granted");
        Ok(())
    }
}

/// Grants every slot immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedIdentifyCoordinator;

#[async_trait]
impl IdentifyCoordinator for UnlimitedIdentifyCoordinator {
    async fn acquire_identify_slot(&self, _shard_id: u32) -> GatewayResult<()> {
        Ok(())
    }
}
