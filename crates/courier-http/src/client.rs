//! REST client facade over the dispatcher

use crate::dispatcher::{DispatcherConfig, RequestDispatcher};
use crate::error::{HttpResult, TransportError};
use crate::request::{HttpResponse, Request};
use crate::route::Route;
use crate::transport::{HttpTransport, ReqwestTransport};
use courier_common::HttpConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Response of `GET /gateway/bot`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayBotInfo {
    pub url: String,
    /// Recommended shard count
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// Identify budget of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until `remaining` resets
    pub reset_after: u64,
    /// Shards allowed to identify within one identify window
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

fn default_max_concurrency() -> u32 {
    1
}

/// Typed entry point for REST calls
pub struct RestClient<T: HttpTransport = ReqwestTransport> {
    dispatcher: RequestDispatcher<T>,
}

impl<T: HttpTransport> Clone for RestClient<T> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl RestClient<ReqwestTransport> {
    /// Client talking to the configured API with `reqwest`
    pub fn from_config(config: &HttpConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.api_url.clone(), &config.token)?;
        Ok(Self::with_transport(transport, DispatcherConfig::from(config)))
    }
}

impl<T: HttpTransport> RestClient<T> {
    #[must_use]
    pub fn new(dispatcher: RequestDispatcher<T>) -> Self {
        Self { dispatcher }
    }

    pub fn with_transport(transport: T, config: DispatcherConfig) -> Self {
        Self::new(RequestDispatcher::new(transport, config))
    }

    #[must_use]
    pub fn dispatcher(&self) -> &RequestDispatcher<T> {
        &self.dispatcher
    }

    /// Dispatch a request and wait for the raw response
    pub async fn request(&self, request: Request) -> HttpResult<HttpResponse> {
        self.dispatcher.submit(request).await
    }

    /// Dispatch a request and decode a JSON response
    pub async fn request_json<R: DeserializeOwned>(&self, request: Request) -> HttpResult<R> {
        self.request(request).await?.json()
    }

    /// Gateway URL, recommended shard count and identify limits
    pub async fn gateway_bot(&self) -> HttpResult<GatewayBotInfo> {
        let info: GatewayBotInfo = self.request_json(Request::new(Route::get("/gateway/bot"))).await?;

        tracing::debug!(
            url = %info.url,
            shards = info.shards,
            max_concurrency = info.session_start_limit.max_concurrency,
            remaining = info.session_start_limit.remaining,
            "Fetched gateway information"
        );

        Ok(info)
    }
}
