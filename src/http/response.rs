//! Client-facing response sink.
//!
//! # Responsibilities
//! - Write exactly one status line and header section per request
//! - Stream body bytes after the head (close-delimited)
//! - Map pre-commit failures to a short plain-text error response
//! - Hand the raw socket over for tunnels
//!
//! # Design Decisions
//! - Every response carries `Connection: close`; one request per connection
//! - [`ResponseWriter::hijack`] consumes the writer, so nothing can be
//!   written through the HTTP framing once the socket has been taken

use std::io::Cursor;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tracing::debug;

use crate::net::Prebuffered;

/// Response side of one client connection.
#[derive(Debug)]
pub struct ResponseWriter<S> {
    io: Prebuffered<S>,
    headers: HeaderMap,
    status: Option<StatusCode>,
}

impl<S> ResponseWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps the client connection the request was read from.
    pub fn new(io: Prebuffered<S>) -> Self {
        Self {
            io,
            headers: HeaderMap::new(),
            status: None,
        }
    }

    /// Headers to send with the status line.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Whether a status line has been written.
    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    /// Writes the status line and headers. Later calls are ignored.
    pub async fn write_head(&mut self, status: StatusCode) -> io::Result<()> {
        if self.is_committed() {
            return Ok(());
        }
        self.status = Some(status);

        self.headers.remove(header::CONNECTION);
        self.headers
            .insert(header::CONNECTION, HeaderValue::from_static("close"));

        let head = encode_head(status, &self.headers);
        let conn = self.io.get_mut();
        conn.write_all(&head).await?;
        conn.flush().await
    }

    /// Writes body bytes, committing a `200 OK` head first if needed.
    pub async fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        if !self.is_committed() {
            self.write_head(StatusCode::OK).await?;
        }
        self.io.get_mut().write_all(chunk).await
    }

    /// Completes the response and half-closes the client connection.
    pub async fn finish(mut self) -> io::Result<()> {
        if !self.is_committed() {
            self.write_head(StatusCode::OK).await?;
        }
        let conn = self.io.get_mut();
        conn.flush().await?;
        conn.shutdown().await
    }

    /// Sends a plain-text error response unless a head was already written.
    ///
    /// Best-effort: write failures are logged and dropped.
    pub async fn fail(&mut self, status: StatusCode, message: &str) {
        if self.is_committed() {
            return;
        }
        self.headers.clear();
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(message.len() + 1));

        if let Err(err) = self.write_error(status, message).await {
            debug!(%status, error = %err, "Failed to send error response");
        }
    }

    async fn write_error(&mut self, status: StatusCode, message: &str) -> io::Result<()> {
        self.write_head(status).await?;
        let conn = self.io.get_mut();
        conn.write_all(message.as_bytes()).await?;
        conn.write_all(b"\n").await?;
        conn.flush().await
    }

    /// Takes the raw client connection out of the HTTP framing.
    pub fn hijack(self) -> Hijacked<S> {
        let (buffered, conn) = self.io.into_parts();
        Hijacked { buffered, conn }
    }
}

/// A client connection taken over from the HTTP layer.
#[derive(Debug)]
pub struct Hijacked<S> {
    buffered: Bytes,
    conn: S,
}

impl<S> Hijacked<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn conn_mut(&mut self) -> &mut S {
        &mut self.conn
    }

    /// Splits into a reader that yields the buffered bytes before the socket,
    /// and the socket's write half.
    pub fn into_split(self) -> (impl AsyncRead + Unpin, WriteHalf<S>) {
        let (rx, tx) = io::split(self.conn);
        (Cursor::new(self.buffered).chain(rx), tx)
    }
}

fn encode_head(status: StatusCode, headers: &HeaderMap) -> BytesMut {
    let mut head = BytesMut::with_capacity(256);
    head.put_slice(b"HTTP/1.1 ");
    head.put_slice(status.as_str().as_bytes());
    head.put_u8(b' ');
    head.put_slice(status.canonical_reason().unwrap_or("Unknown").as_bytes());
    head.put_slice(b"\r\n");
    for (name, value) in headers {
        put_title_case(&mut head, name.as_str());
        head.put_slice(b": ");
        head.put_slice(value.as_bytes());
        head.put_slice(b"\r\n");
    }
    head.put_slice(b"\r\n");
    head
}

/// `content-type` is written as `Content-Type`.
fn put_title_case(dst: &mut BytesMut, name: &str) {
    let mut upper = true;
    for b in name.bytes() {
        dst.put_u8(if upper { b.to_ascii_uppercase() } else { b });
        upper = b == b'-';
    }
}
