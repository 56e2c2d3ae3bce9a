//! Proxy bridging engine.
//!
//! # Data Flow
//! ```text
//! ClientRequest + ResponseWriter
//!     → Bridge::handle (classify by method)
//!     → upstream.rs (dial, cork, transform, destination token)
//!     → forward.rs  (rewrite, exchange, stream response)   [plain]
//!     → tunnel.rs   (hijack, acknowledge, relay.rs)        [CONNECT]
//! ```
//!
//! # Design Decisions
//! - One upstream connection per session, never pooled
//! - Headers cross in either direction only through `headers::copy_headers`
//! - The bridge never learns the concrete upstream stream type

pub mod forward;
pub mod headers;
pub mod relay;
pub mod tunnel;
pub mod upstream;

use std::fmt;
use std::sync::Arc;

use http::HeaderValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::config::{BridgeConfig, ValidationError};
use crate::error::BridgeResult;
use crate::http::{ClientRequest, ResponseWriter};

pub use headers::{copy_headers, is_hop_by_hop, HOP_BY_HOP};
pub use relay::{relay, RelayStats};
pub use tunnel::CONNECT_ESTABLISHED;
pub use upstream::{
    destination_for, Connector, DestinationEncoder, PlainTransform, TextDestination, Transform,
    UpstreamIo, UpstreamStream,
};

/// How a request is bridged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// CONNECT: raw bytes after the acknowledgment.
    Tunnel,
    /// Any other method: one request/response exchange.
    Forward,
}

impl SessionKind {
    pub fn of(req: &ClientRequest) -> Self {
        if req.is_connect() {
            SessionKind::Tunnel
        } else {
            SessionKind::Forward
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Tunnel => write!(f, "tunnel"),
            SessionKind::Forward => write!(f, "forward"),
        }
    }
}

/// Bridges client requests onto upstream connections.
pub struct Bridge {
    connector: Connector,
    encoder: Arc<dyn DestinationEncoder>,
    user_agent: Option<HeaderValue>,
}

impl Bridge {
    pub fn new(connector: Connector, encoder: Arc<dyn DestinationEncoder>) -> Self {
        Self {
            connector,
            encoder,
            user_agent: None,
        }
    }

    /// Replace `User-Agent` on forwarded requests.
    pub fn with_user_agent(mut self, user_agent: Option<HeaderValue>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Builds a bridge for the configured upstream.
    pub fn from_config(
        config: &BridgeConfig,
        transform: Arc<dyn Transform>,
        encoder: Arc<dyn DestinationEncoder>,
    ) -> Result<Self, ValidationError> {
        let user_agent = config
            .upstream
            .user_agent
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| ValidationError::InvalidUserAgent)?;

        let connector = Connector::new(config.upstream.address.clone(), transform)
            .with_cork(config.cork.policy());
        Ok(Self::new(connector, encoder).with_user_agent(user_agent))
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Handles one client request to completion.
    ///
    /// Writes exactly one status line, or the tunnel acknowledgment, before
    /// any payload. The returned error is for logging; the client has already
    /// been answered where that was still possible.
    pub async fn handle<S>(&self, req: ClientRequest, resp: ResponseWriter<S>) -> BridgeResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(
            proto = req.proto(),
            method = %req.method,
            host = req.host().as_deref().unwrap_or("-"),
            "Proxy request"
        );

        match SessionKind::of(&req) {
            SessionKind::Tunnel => self.tunnel(req, resp).await,
            SessionKind::Forward => self.forward(req, resp).await,
        }
    }

    fn log_session(&self, req: &ClientRequest, target: &str) {
        let peer = req
            .peer_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            kind = %SessionKind::of(req),
            "proxy {} <-> {} <-> {}",
            peer,
            self.connector.address(),
            target
        );
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("connector", &self.connector)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}
