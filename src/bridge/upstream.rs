//! Upstream connections and the seams around them.
//!
//! # Responsibilities
//! - Dial the fixed upstream address, once per session
//! - Apply the optional corking decorator, then the transform
//! - Turn a request host into the `host:port` destination and its token
//!
//! # Design Decisions
//! - The transform and the encoder are injected trait objects; bridging
//!   logic never sees a concrete stream type
//! - No retry: a failed dial fails the session

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::uri::Authority;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{BridgeError, BridgeResult, DestinationError};
use crate::net::{CorkPolicy, Corked};

/// Port assumed for plain HTTP targets that do not name one.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// A duplex byte stream to the upstream.
pub trait UpstreamIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> UpstreamIo for T {}

/// An owned, type-erased upstream connection.
pub type UpstreamStream = Box<dyn UpstreamIo>;

/// A stream decorator applied to every upstream connection right after dial.
pub trait Transform: Send + Sync {
    fn apply(&self, conn: UpstreamStream) -> UpstreamStream;
}

impl<F> Transform for F
where
    F: Fn(UpstreamStream) -> UpstreamStream + Send + Sync,
{
    fn apply(&self, conn: UpstreamStream) -> UpstreamStream {
        self(conn)
    }
}

/// The identity transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTransform;

impl Transform for PlainTransform {
    fn apply(&self, conn: UpstreamStream) -> UpstreamStream {
        conn
    }
}

/// Produces the wire-format destination token for a `host:port` target.
pub trait DestinationEncoder: Send + Sync {
    fn encode(&self, host_port: &str) -> Result<Bytes, DestinationError>;
}

/// Encodes the destination as `host:port\r\n` in ASCII.
///
/// Meant for plaintext relays and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDestination;

impl DestinationEncoder for TextDestination {
    fn encode(&self, host_port: &str) -> Result<Bytes, DestinationError> {
        let (host, port) = host_port
            .rsplit_once(':')
            .ok_or_else(|| DestinationError::new(host_port, "missing port"))?;
        if host.is_empty() {
            return Err(DestinationError::new(host_port, "empty host"));
        }
        if port.parse::<u16>().is_err() {
            return Err(DestinationError::new(host_port, "invalid port"));
        }
        if !host_port.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(DestinationError::new(host_port, "invalid character"));
        }
        let mut token = Vec::with_capacity(host_port.len() + 2);
        token.extend_from_slice(host_port.as_bytes());
        token.extend_from_slice(b"\r\n");
        Ok(Bytes::from(token))
    }
}

/// Returns `host` with the default HTTP port appended if it has none.
///
/// IPv6 literals keep their brackets: `[::1]` becomes `[::1]:80`.
pub fn destination_for(host: &str) -> String {
    let has_port = match host.parse::<Authority>() {
        Ok(authority) => authority.port().is_some(),
        Err(_) => host.contains(':'),
    };
    if has_port {
        host.to_string()
    } else {
        format!("{}:{}", host, DEFAULT_HTTP_PORT)
    }
}

/// Opens upstream connections.
#[derive(Clone)]
pub struct Connector {
    address: String,
    cork: Option<CorkPolicy>,
    transform: Arc<dyn Transform>,
}

impl Connector {
    pub fn new(address: impl Into<String>, transform: Arc<dyn Transform>) -> Self {
        Self {
            address: address.into(),
            cork: None,
            transform,
        }
    }

    /// Coalesce writes on new connections according to `policy`.
    pub fn with_cork(mut self, policy: Option<CorkPolicy>) -> Self {
        self.cork = policy;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dials a fresh upstream connection.
    pub async fn connect(&self) -> BridgeResult<UpstreamStream> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|source| BridgeError::Dial {
                addr: self.address.clone(),
                source,
            })?;

        let conn: UpstreamStream = match self.cork {
            Some(policy) => Box::new(Corked::new(stream, policy)),
            None => Box::new(stream),
        };
        Ok(self.transform.apply(conn))
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("address", &self.address)
            .field("cork", &self.cork)
            .finish_non_exhaustive()
    }
}
