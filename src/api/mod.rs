//! API Module
//!
//! Provides the REST protocol gateway for one driver, its request metrics
//! and the server that runs it.

pub mod metrics;
pub mod rest;
pub mod server;

pub use metrics::GatewayMetrics;
pub use rest::*;
pub use server::*;
