//! Shard cluster
//!
//! Spawns one task per owned shard, shares the identify coordinator between them and
//! persists their resumable sessions when they stop.

use crate::coordinator::{IdentifyCoordinator, UnlimitedIdentifyCoordinator};
use crate::error::{GatewayError, GatewayResult};
use crate::resume::{MemoryResumeStore, ResumeStore};
use crate::session::{SessionSnapshot, ShardInfo};
use crate::shard::{Shard, ShardConfig, ShardHandle};
use crate::sink::{EventSink, TracingSink};
use crate::transport::GatewayTransport;
use courier_common::GatewayConfig;
use courier_http::{GatewayBotInfo, HttpTransport, RestClient};
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};

/// Which shards this process runs, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPlan {
    pub url: String,
    pub shard_count: u32,
    /// Shards owned by this process
    pub shard_ids: Range<u32>,
    pub max_concurrency: u32,
}

impl ClusterPlan {
    /// Combine the server's recommendation with configured overrides
    pub fn resolve(config: &GatewayConfig, info: &GatewayBotInfo) -> GatewayResult<Self> {
        let shard_count = config.shard_count.unwrap_or(info.shards).max(1);
        let shard_ids = config.shard_range.clone().unwrap_or(0..shard_count);

        if shard_ids.is_empty() || shard_ids.end > shard_count {
            return Err(GatewayError::Config(format!(
                "shard range {}..{} does not fit {shard_count} shards",
                shard_ids.start, shard_ids.end
            )));
        }

        let owned = shard_ids.end - shard_ids.start;
        if info.session_start_limit.remaining < owned {
            tracing::warn!(
                remaining = info.session_start_limit.remaining,
                shards = owned,
                reset_after_ms = info.session_start_limit.reset_after,
                "Not enough session starts left to identify every shard"
            );
        }

        Ok(Self {
            url: config.url.clone().unwrap_or_else(|| info.url.clone()),
            shard_count,
            shard_ids,
            max_concurrency: config
                .max_identify_concurrency
                .unwrap_or(info.session_start_limit.max_concurrency)
                .max(1),
        })
    }

    /// Ask the REST API for gateway information and resolve the plan
    pub async fn fetch<H: HttpTransport>(rest: &RestClient<H>, config: &GatewayConfig) -> GatewayResult<Self> {
        let info = rest.gateway_bot().await?;
        Self::resolve(config, &info)
    }
}

/// Builder for `ShardCluster`
pub struct ShardClusterBuilder<T: GatewayTransport> {
    plan: ClusterPlan,
    config: Arc<ShardConfig>,
    transport: Arc<T>,
    coordinator: Arc<dyn IdentifyCoordinator>,
    sink: Arc<dyn EventSink>,
    store: Arc<dyn ResumeStore>,
}

impl<T: GatewayTransport> ShardClusterBuilder<T> {
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

    #[must_use]
    pub fn store(mut self, store: Arc<dyn ResumeStore>) -> Self {
        self.store = store;
        self
    }

    /// Spawn every shard of the plan
    pub async fn start(self) -> GatewayResult<ShardCluster> {
        let mut handles = Vec::new();
        let mut tasks = JoinSet::new();

        for id in self.plan.shard_ids.clone() {
            let snapshot = match self.store.load(id).await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    tracing::warn!(shard_id = id, error = %error, "Failed to load resume state");
                    None
                }
            };

            let (shard, handle) = Shard::builder(
                ShardInfo::new(id, self.plan.shard_count),
                Arc::clone(&self.config),
                Arc::clone(&self.transport),
            )
            .coordinator(Arc::clone(&self.coordinator))
            .sink(Arc::clone(&self.sink))
            .snapshot(snapshot)
            .build();

            tasks.spawn(async move { (id, shard.run().await) });
            handles.push(handle);
        }

        tracing::info!(
            shards = handles.len(),
            shard_count = self.plan.shard_count,
            max_concurrency = self.plan.max_concurrency,
            "Shard cluster started"
        );

        Ok(ShardCluster {
            plan: self.plan,
            handles,
            tasks,
            store: self.store,
        })
    }
}

type ShardOutcome = (u32, GatewayResult<Option<SessionSnapshot>>);

/// Running shards of this process
pub struct ShardCluster {
    plan: ClusterPlan,
    handles: Vec<ShardHandle>,
    tasks: JoinSet<ShardOutcome>,
    store: Arc<dyn ResumeStore>,
}

impl ShardCluster {
    pub fn builder<T: GatewayTransport>(
        plan: ClusterPlan,
        config: Arc<ShardConfig>,
        transport: Arc<T>,
    ) -> ShardClusterBuilder<T> {
        ShardClusterBuilder {
            plan,
            config,
            transport,
            coordinator: Arc::new(UnlimitedIdentifyCoordinator),
            sink: Arc::new(TracingSink),
            store: Arc::new(MemoryResumeStore::new()),
        }
    }

    #[must_use]
    pub fn plan(&self) -> &ClusterPlan {
        &self.plan
    }

    #[must_use]
    pub fn handles(&self) -> &[ShardHandle] {
        &self.handles
    }

    #[must_use]
    pub fn shard(&self, id: u32) -> Option<&ShardHandle> {
        self.handles.iter().find(|handle| handle.info().id == id)
    }

    /// Run until `signal` resolves or every shard has stopped on its own
    ///
    /// Returns the first shard failure, if any.
    pub async fn run_until<F: Future<Output = ()>>(mut self, signal: F) -> GatewayResult<()> {
        tokio::pin!(signal);
        let mut first_error = None;

        loop {
            tokio::select! {
                () = &mut signal => {
                    tracing::info!(shards = self.handles.len(), "Stopping shard cluster");
                    for handle in &self.handles {
                        handle.shutdown();
                    }
                    break;
                }
                joined = self.tasks.join_next() => match joined {
                    Some(joined) => self.finish(joined, &mut first_error).await,
                    None => break,
                },
            }
        }

        while let Some(joined) = self.tasks.join_next().await {
            self.finish(joined, &mut first_error).await;
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stop every shard and persist their sessions
    pub async fn shutdown(self) -> GatewayResult<()> {
        self.run_until(std::future::ready(())).await
    }

    async fn finish(&self, joined: Result<ShardOutcome, JoinError>, first_error: &mut Option<GatewayError>) {
        let (id, result) = match joined {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(error = %error, "Shard task aborted");
                return;
            }
        };

        let stored = match &result {
            Ok(Some(snapshot)) => self.store.save(id, snapshot).await,
            Ok(None) | Err(_) => self.store.remove(id).await,
        };
        if let Err(error) = stored {
            tracing::warn!(shard_id = id, error = %error, "Failed to persist resume state");
        }

        if let Err(error) = result {
            if first_error.is_none() {
                *first_error = Some(error);
            }
        }
    }
}
