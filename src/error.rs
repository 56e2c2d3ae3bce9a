//! Error types for the bridging engine.

use std::io;

use thiserror::Error;

/// Errors that end a bridge session.
///
/// Everything here is surfaced to the caller for logging. Whether the client
/// also sees an error status depends on how far the session got: once a
/// status line (or the tunnel acknowledgment) has been written, nothing else
/// is sent.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The upstream could not be reached.
    #[error("failed to connect to upstream {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Neither the request target nor the `Host` header named a host.
    #[error("request has no target host")]
    MissingHost,

    /// The destination encoder refused the target.
    #[error(transparent)]
    Destination(#[from] DestinationError),

    /// Writing the destination token upstream failed.
    #[error("failed to send target address: {0}")]
    SendDestination(#[source] io::Error),

    /// The outgoing request could not be assembled.
    #[error("failed to build upstream request: {0}")]
    BuildRequest(#[source] http::Error),

    /// HTTP exchange with the upstream failed.
    #[error("upstream exchange failed: {0}")]
    Upstream(#[source] hyper::Error),

    /// Reading from or writing to the client failed.
    #[error("client connection error: {0}")]
    Client(#[source] io::Error),
}

/// Returned by a [`DestinationEncoder`](crate::bridge::DestinationEncoder)
/// that cannot represent a target.
#[derive(Debug, Error)]
#[error("cannot encode destination {target:?}: {reason}")]
pub struct DestinationError {
    pub target: String,
    pub reason: &'static str,
}

impl DestinationError {
    pub fn new(target: impl Into<String>, reason: &'static str) -> Self {
        Self {
            target: target.into(),
            reason,
        }
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
