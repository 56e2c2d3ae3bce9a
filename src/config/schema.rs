//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::CorkPolicy;

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Upstream transport endpoint and request rewriting.
    pub upstream: UpstreamConfig,

    /// Write coalescing on upstream connections.
    pub cork: CorkConfig,

    /// Request size limits enforced by the HTTP front-end.
    pub limits: LimitsConfig,

    /// Startup and shutdown behavior.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8118").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8118".to_string(),
            max_connections: 1024,
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:8388"). Every session dials it.
    pub address: String,

    /// Replaces the client's `User-Agent` on forwarded requests.
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8388".to_string(),
            user_agent: None,
        }
    }
}

/// Write coalescing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CorkConfig {
    /// Coalesce small upstream writes.
    pub enabled: bool,

    /// Longest time a partial batch is held back, in milliseconds.
    pub delay_ms: u64,

    /// Batch size that is written through immediately.
    pub threshold_bytes: usize,
}

impl Default for CorkConfig {
    fn default() -> Self {
        let policy = CorkPolicy::default();
        Self {
            enabled: false,
            delay_ms: policy.delay.as_millis() as u64,
            threshold_bytes: policy.threshold,
        }
    }
}

impl CorkConfig {
    /// The policy to apply, if corking is enabled.
    pub fn policy(&self) -> Option<CorkPolicy> {
        self.enabled.then(|| CorkPolicy {
            delay: Duration::from_millis(self.delay_ms),
            threshold: self.threshold_bytes,
        })
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of the request line plus headers.
    pub max_header_bytes: usize,

    /// Maximum size of a buffered request body.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long shutdown waits for live sessions, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 5,
        }
    }
}

impl LifecycleConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
