//! # courier-http
//!
//! Rate-limited REST dispatcher: route keys, quota buckets, the per-route request
//! queue and the HTTP transport boundary.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod ratelimit;
pub mod request;
pub mod route;
pub mod transport;

pub use client::{GatewayBotInfo, RestClient, SessionStartLimit};
pub use dispatcher::{DispatcherConfig, RequestDispatcher, ResponseFuture};
pub use error::{HttpError, HttpResult, TransportError};
pub use ratelimit::{BucketKey, BucketSnapshot};
pub use request::{HttpResponse, Request};
pub use route::{Method, Route, RouteKey};
pub use transport::{HttpTransport, ReqwestTransport};
