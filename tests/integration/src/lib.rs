//! Integration test utilities for courier
//!
//! Scripted HTTP transports, an emulated rate-limited server, and gateway fixtures
//! driven over the in-memory gateway transport.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
