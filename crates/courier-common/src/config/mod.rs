//! Configuration structs

mod app_config;

pub use app_config::{
    parse_shard_range, AppSettings, BackoffConfig, ClientConfig, ConfigError, Environment,
    GatewayConfig, HttpConfig,
};
