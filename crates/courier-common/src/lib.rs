//! # courier-common
//!
//! Shared utilities including configuration, the error taxonomy, retry backoff, and telemetry.

pub mod backoff;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use backoff::Backoff;
pub use config::{
    parse_shard_range, AppSettings, BackoffConfig, ClientConfig, ConfigError, Environment,
    GatewayConfig, HttpConfig,
};
pub use error::ErrorClass;
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
