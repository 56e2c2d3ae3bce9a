//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use http::HeaderValue;
use http_bridge::bridge::{Bridge, Connector, PlainTransform, TextDestination};
use http_bridge::config::BridgeConfig;
use http_bridge::http::HttpServer;
use http_bridge::lifecycle::Shutdown;
use http_bridge::net::{CorkPolicy, Listener};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// What a mock upstream saw on one connection.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// The destination line, without CRLF.
    pub destination: String,
    /// The request head as received, including the final blank line.
    pub head: String,
    pub body: Vec<u8>,
}

impl Recorded {
    /// Whether the head has a header with this name, ignoring case.
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

/// Start a mock upstream that reads the destination line and one HTTP
/// request, records them and answers with `response` before closing.
pub async fn start_http_upstream(response: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut socket = BufReader::new(socket);

                let mut destination = String::new();
                socket.read_line(&mut destination).await.unwrap();

                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    if socket.read_line(&mut line).await.unwrap() == 0 {
                        break;
                    }
                    head.push_str(&line);
                    if line == "\r\n" {
                        break;
                    }
                }

                let mut recorded = Recorded {
                    destination: destination.trim_end().to_string(),
                    head,
                    body: Vec::new(),
                };
                if let Some(len) = recorded.header("content-length") {
                    let mut body = vec![0u8; len.parse().unwrap()];
                    socket.read_exact(&mut body).await.unwrap();
                    recorded.body = body;
                }
                let _ = tx.send(recorded);

                let mut socket = socket.into_inner();
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// Start a mock upstream that reads the destination line, then echoes every
/// byte back until the client half-closes.
pub async fn start_echo_upstream() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut read = BufReader::new(read);

                let mut destination = String::new();
                read.read_line(&mut destination).await.unwrap();
                let _ = tx.send(destination.trim_end().to_string());

                let _ = tokio::io::copy(&mut read, &mut write).await;
                let _ = write.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Options for [`start_bridge`].
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    pub user_agent: Option<&'static str>,
    pub cork: Option<CorkPolicy>,
}

/// Start a bridge in front of `upstream` on an ephemeral port.
pub async fn start_bridge(upstream: SocketAddr, options: BridgeOptions) -> (SocketAddr, Shutdown) {
    let config = BridgeConfig::default();
    let connector = Connector::new(upstream.to_string(), Arc::new(PlainTransform)).with_cork(options.cork);
    let bridge = Bridge::new(connector, Arc::new(TextDestination))
        .with_user_agent(options.user_agent.map(HeaderValue::from_static));

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, Arc::new(bridge));
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    (addr, shutdown)
}
