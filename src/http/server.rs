//! HTTP proxy server.
//!
//! # Responsibilities
//! - Accept client connections through the bounded listener
//! - Read one request per connection and hand it to the bridge
//! - Answer unreadable requests with a 4xx/5xx status
//! - Stop accepting on shutdown and drain live sessions
//!
//! # Design Decisions
//! - One Tokio task per client connection
//! - No keep-alive: every response closes its connection

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Instrument};

use crate::bridge::Bridge;
use crate::config::{BridgeConfig, LimitsConfig};
use crate::http::request::read_request;
use crate::http::response::ResponseWriter;
use crate::net::{Listener, ListenerError, Prebuffered, SessionTracker};

/// Accept loop in front of a [`Bridge`].
pub struct HttpServer {
    bridge: Arc<Bridge>,
    limits: LimitsConfig,
    drain_timeout: Duration,
    sessions: SessionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &BridgeConfig, bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            limits: config.limits.clone(),
            drain_timeout: config.lifecycle.drain_timeout(),
            sessions: SessionTracker::new(),
        }
    }

    /// Live session count.
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Serve until `shutdown` fires, then wait for sessions to finish.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, upstream = %self.bridge.connector().address(), "HTTP proxy starting");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(err)) => {
                            warn!(error = %err, "Failed to accept connection");
                            continue;
                        }
                        Err(err) => return Err(err),
                    };

                    let guard = self.sessions.track();
                    let span = tracing::debug_span!("session", id = %guard.id(), peer = %peer);
                    let bridge = self.bridge.clone();
                    let limits = self.limits.clone();
                    tokio::spawn(
                        async move {
                            serve_connection(stream, peer, bridge, limits).await;
                            drop(guard);
                            drop(permit);
                        }
                        .instrument(span),
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        let remaining = self.sessions.drain(self.drain_timeout).await;
        if remaining > 0 {
            warn!(remaining, "Drain timeout elapsed with sessions still open");
        }
        info!("HTTP proxy stopped");
        Ok(())
    }
}

/// Serves the single request of one client connection.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    bridge: Arc<Bridge>,
    limits: LimitsConfig,
) {
    let _ = stream.set_nodelay(true);
    let mut reader = Prebuffered::new(stream, limits.max_header_bytes);

    let req = match read_request(&mut reader, Some(peer), &limits).await {
        Ok(Some(req)) => req,
        Ok(None) => {
            debug!("Client closed before sending a request");
            return;
        }
        Err(err) => {
            warn!(error = %err, "Rejected client request");
            if let Some(status) = err.status() {
                let mut resp = ResponseWriter::new(reader);
                resp.fail(status, &err.to_string()).await;
            }
            return;
        }
    };

    let resp = ResponseWriter::new(reader);
    if let Err(err) = bridge.handle(req, resp).await {
        warn!(error = %err, "Error serving proxy relay");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Connector, PlainTransform, TextDestination};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn start(max_connections: usize) -> (SocketAddr, crate::lifecycle::Shutdown, tokio::task::JoinHandle<Result<(), ListenerError>>) {
        let config = BridgeConfig::default();
        let bridge = Arc::new(Bridge::new(
            Connector::new("127.0.0.1:9", Arc::new(PlainTransform)),
            Arc::new(TextDestination),
        ));
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let listener = Listener::from_tcp(tcp, max_connections);
        let shutdown = crate::lifecycle::Shutdown::new();
        let server = HttpServer::new(&config, bridge);
        let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
        (addr, shutdown, handle)
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let (addr, shutdown, handle) = start(4).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"CONNECT example.com HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));

        shutdown.trigger();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_accepting() {
        let (addr, shutdown, handle) = start(4).await;
        shutdown.trigger();
        handle.await.unwrap().unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
