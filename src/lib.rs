//! Local HTTP proxy bridge.
//!
//! Accepts plain HTTP proxy requests and CONNECT tunnels from local clients
//! and carries each one over its own connection to a fixed upstream, behind
//! a pluggable stream transform and destination encoder.

pub mod bridge;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use bridge::Bridge;
pub use config::schema::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
