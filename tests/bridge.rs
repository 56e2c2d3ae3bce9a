//! End-to-end tests: real sockets on both sides of the bridge.

use std::time::Duration;

use http_bridge::bridge::CONNECT_ESTABLISHED;
use http_bridge::net::CorkPolicy;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

use common::{BridgeOptions, Recorded};

const UPSTREAM_RESPONSE: &str = "HTTP/1.1 202 Accepted\r\n\
    Content-Length: 5\r\n\
    Connection: keep-alive, X-Upstream-Hop\r\n\
    Keep-Alive: timeout=5\r\n\
    X-Upstream-Hop: 1\r\n\
    X-Upstream: yes\r\n\
    \r\n\
    hello";

async fn exchange(addr: std::net::SocketAddr, request: &[u8]) -> String {
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(request).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut out))
        .await
        .expect("bridge should close the connection")
        .unwrap();
    String::from_utf8(out).unwrap()
}

async fn recorded(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Recorded>) -> Recorded {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("upstream should see a request")
        .unwrap()
}

#[tokio::test]
async fn plain_get_is_sanitized_both_ways() {
    let (upstream, mut seen) = common::start_http_upstream(UPSTREAM_RESPONSE).await;
    let (bridge, shutdown) = common::start_bridge(upstream, BridgeOptions::default()).await;

    let response = exchange(
        bridge,
        b"GET http://example.com/ HTTP/1.1\r\n\
          Host: example.com\r\n\
          Connection: close, X-Client-Hop\r\n\
          Keep-Alive: timeout=1\r\n\
          X-Client-Hop: secret\r\n\
          Accept: */*\r\n\
          \r\n",
    )
    .await;

    let req = recorded(&mut seen).await;
    assert_eq!(req.destination, "example.com:80");
    assert!(req.head.starts_with("GET / HTTP/1.1\r\n"), "{}", req.head);
    assert_eq!(req.header("host"), Some("example.com"));
    assert_eq!(req.header("accept"), Some("*/*"));
    assert!(!req.has_header("connection"));
    assert!(!req.has_header("keep-alive"));
    assert!(!req.has_header("x-client-hop"));

    assert!(response.starts_with("HTTP/1.1 202 Accepted\r\n"));
    assert!(response.contains("X-Upstream: yes\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(!response.contains("Keep-Alive"));
    assert!(!response.contains("X-Upstream-Hop"));
    assert!(response.ends_with("\r\n\r\nhello"));

    shutdown.trigger();
}

#[tokio::test]
async fn explicit_port_and_body_are_forwarded() {
    let (upstream, mut seen) = common::start_http_upstream(UPSTREAM_RESPONSE).await;
    let (bridge, shutdown) = common::start_bridge(upstream, BridgeOptions::default()).await;

    exchange(
        bridge,
        b"POST http://example.com:8080/submit?x=1 HTTP/1.1\r\n\
          Host: example.com:8080\r\n\
          Transfer-Encoding: chunked\r\n\
          \r\n\
          4\r\nabcd\r\n0\r\n\r\n",
    )
    .await;

    let req = recorded(&mut seen).await;
    assert_eq!(req.destination, "example.com:8080");
    assert!(req.head.starts_with("POST /submit?x=1 HTTP/1.1\r\n"));
    assert!(!req.has_header("transfer-encoding"));
    assert_eq!(req.header("content-length"), Some("4"));
    assert_eq!(req.body, b"abcd");

    shutdown.trigger();
}

#[tokio::test]
async fn user_agent_override_replaces_client_value() {
    let (upstream, mut seen) = common::start_http_upstream(UPSTREAM_RESPONSE).await;
    let options = BridgeOptions {
        user_agent: Some("bridge-test/1.0"),
        ..BridgeOptions::default()
    };
    let (bridge, shutdown) = common::start_bridge(upstream, options).await;

    exchange(
        bridge,
        b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\nUser-Agent: curl/8.0\r\n\r\n",
    )
    .await;

    let req = recorded(&mut seen).await;
    assert_eq!(req.header("user-agent"), Some("bridge-test/1.0"));
    assert!(!req.head.contains("curl"));

    shutdown.trigger();
}

#[tokio::test]
async fn reqwest_through_http_proxy() {
    let (upstream, mut seen) = common::start_http_upstream(UPSTREAM_RESPONSE).await;
    let (bridge, shutdown) = common::start_bridge(upstream, BridgeOptions::default()).await;

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{}", bridge)).unwrap())
        .build()
        .unwrap();
    let res = client
        .get("http://example.com/index.html")
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), 202);
    assert_eq!(res.headers()["x-upstream"], "yes");
    assert!(res.headers().get("x-upstream-hop").is_none());
    assert_eq!(res.text().await.unwrap(), "hello");

    let req = recorded(&mut seen).await;
    assert_eq!(req.destination, "example.com:80");
    assert!(req.head.starts_with("GET /index.html HTTP/1.1\r\n"));

    shutdown.trigger();
}

#[tokio::test]
async fn unreachable_upstream_answers_500() {
    let (bridge, shutdown) = common::start_bridge(common::closed_addr().await, BridgeOptions::default()).await;

    let response = exchange(bridge, b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));

    let response = exchange(bridge, b"CONNECT example.com:443 HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(!response.contains("Connection established"));

    shutdown.trigger();
}

async fn tunnel_round_trip(options: BridgeOptions) {
    let (upstream, mut seen) = common::start_echo_upstream().await;
    let (bridge, shutdown) = common::start_bridge(upstream, options).await;

    let mut client = TcpStream::connect(bridge).await.unwrap();
    client
        .write_all(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
        .await
        .unwrap();

    let mut ack = vec![0u8; CONNECT_ESTABLISHED.len()];
    client.read_exact(&mut ack).await.unwrap();
    assert_eq!(ack, b"HTTP/1.0 200 Connection established\r\n\r\n");

    let destination = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(destination, "example.com:443");

    client.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut echoed))
        .await
        .expect("echo should come back")
        .unwrap();
    assert_eq!(&echoed, b"ping");

    client.write_all(b"\x00\xffbinary").await.unwrap();
    client.shutdown().await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .expect("tunnel should close after both sides finish")
        .unwrap();
    assert_eq!(rest, b"\x00\xffbinary");

    shutdown.trigger();
}

#[tokio::test]
async fn connect_tunnel_relays_raw_bytes() {
    tunnel_round_trip(BridgeOptions::default()).await;
}

#[tokio::test]
async fn connect_tunnel_with_corking() {
    tunnel_round_trip(BridgeOptions {
        cork: Some(CorkPolicy::default()),
        ..BridgeOptions::default()
    })
    .await;
}

#[tokio::test]
async fn bytes_sent_with_connect_head_reach_upstream() {
    let (upstream, _seen) = common::start_echo_upstream().await;
    let (bridge, shutdown) = common::start_bridge(upstream, BridgeOptions::default()).await;

    let mut client = TcpStream::connect(bridge).await.unwrap();
    client
        .write_all(b"CONNECT example.com:443 HTTP/1.1\r\n\r\nearly-bytes")
        .await
        .unwrap();
    client.shutdown().await.unwrap();

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    let mut expected = CONNECT_ESTABLISHED.to_vec();
    expected.extend_from_slice(b"early-bytes");
    assert_eq!(out, expected);

    shutdown.trigger();
}
