//! Request reading and classification.
//!
//! # Responsibilities
//! - Parse the request line and header section (httparse)
//! - Validate the request target for its method
//! - Read and de-chunk the request body into memory
//! - Answer `Expect: 100-continue`
//!
//! # Design Decisions
//! - Header size limit enforced before the body is touched
//! - Bodies are fully buffered; `limits.max_body_bytes` bounds them
//! - Bytes past the head are never consumed for CONNECT, so a tunnel
//!   receives them intact

use std::net::SocketAddr;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri, Version};
use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::LimitsConfig;
use crate::net::Prebuffered;

/// Maximum number of header fields in a request head.
pub const MAX_HEADERS: usize = 100;

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Why a request could not be read.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("invalid request line: {0}")]
    InvalidRequestLine(&'static str),

    #[error("invalid header field {0:?}")]
    InvalidHeader(String),

    #[error("CONNECT target must be host:port, got {0:?}")]
    InvalidConnectTarget(String),

    #[error("unsupported transfer encoding {0:?}")]
    UnsupportedTransferEncoding(String),

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("invalid chunked body: {0}")]
    InvalidChunk(&'static str),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("client connection error: {0}")]
    Io(#[from] io::Error),
}

impl RequestError {
    /// Status code to answer with, if the client is still listening.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::HeadTooLarge(_) => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            RequestError::BodyTooLarge(_) => Some(StatusCode::PAYLOAD_TOO_LARGE),
            RequestError::UnsupportedTransferEncoding(_) => Some(StatusCode::NOT_IMPLEMENTED),
            RequestError::Io(_) => None,
            _ => Some(StatusCode::BAD_REQUEST),
        }
    }
}

/// A parsed client request with its body fully buffered.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: Method,
    /// The request target exactly as sent.
    pub target: String,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub peer_addr: Option<SocketAddr>,
}

impl ClientRequest {
    /// The target host: the authority of an absolute-form or authority-form
    /// target, else the `Host` header.
    pub fn host(&self) -> Option<String> {
        if let Some(authority) = self.target_authority() {
            return Some(authority.to_string());
        }
        self.headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
    }

    /// `host[:port]` of the request target, without any userinfo.
    pub fn target_authority(&self) -> Option<&str> {
        let authority = self.uri.authority()?.as_str();
        Some(authority.rsplit_once('@').map_or(authority, |(_, host)| host))
    }

    pub fn is_connect(&self) -> bool {
        self.method == Method::CONNECT
    }

    /// Protocol string as it appears on the request line.
    pub fn proto(&self) -> &'static str {
        match self.version {
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        }
    }
}

/// Request line and header section.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Parses a head from a buffer and returns `None` when incomplete.
    ///
    /// Returns the length of the header section and the head.
    pub fn parse_with_len(buf: &[u8]) -> Result<Option<(usize, Self)>, RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(buf)? {
            httparse::Status::Partial => Ok(None),
            httparse::Status::Complete(len) => Self::from_httparse(&req).map(|head| Some((len, head))),
        }
    }

    fn from_httparse(req: &httparse::Request<'_, '_>) -> Result<Self, RequestError> {
        let method = req
            .method
            .ok_or(RequestError::InvalidRequestLine("missing method"))?;
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| RequestError::InvalidRequestLine("invalid method"))?;
        let target = req
            .path
            .ok_or(RequestError::InvalidRequestLine("missing request target"))?;
        let uri = Uri::from_str(target)
            .map_err(|_| RequestError::InvalidRequestLine("invalid request target"))?;
        let version = match req.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        if method == Method::CONNECT {
            let valid = uri.scheme().is_none()
                && uri.path_and_query().is_none()
                && uri.authority().is_some_and(|a| a.port_u16().is_some());
            if !valid {
                return Err(RequestError::InvalidConnectTarget(target.to_string()));
            }
        }

        let mut map = HeaderMap::with_capacity(req.headers.len());
        for h in req.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|_| RequestError::InvalidHeader(h.name.to_string()))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|_| RequestError::InvalidHeader(h.name.to_string()))?;
            map.append(name, value);
        }

        Ok(Self {
            method,
            target: target.to_string(),
            uri,
            version,
            headers: map,
        })
    }

    /// Reads and parses the head, removing it from `reader`.
    ///
    /// Returns `None` if the client closed the connection before sending anything.
    pub async fn read<S: AsyncRead + Unpin>(
        reader: &mut Prebuffered<S>,
        max_len: usize,
    ) -> Result<Option<Self>, RequestError> {
        loop {
            if let Some((len, head)) = Self::parse_with_len(reader.buffer())? {
                reader.discard(len);
                return Ok(Some(head));
            }
            if reader.is_full() {
                return Err(RequestError::HeadTooLarge(max_len));
            }
            if reader.buffer_more().await? == 0 {
                if reader.buffer().is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
        }
    }
}

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
}

fn body_framing(headers: &HeaderMap) -> Result<BodyFraming, RequestError> {
    if let Some(te) = headers.get(header::TRANSFER_ENCODING) {
        let te = te
            .to_str()
            .map_err(|_| RequestError::UnsupportedTransferEncoding("<binary>".into()))?;
        let last = te.rsplit(',').next().unwrap_or("").trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(BodyFraming::Chunked);
        }
        return Err(RequestError::UnsupportedTransferEncoding(te.to_string()));
    }

    let mut length = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let n = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or(RequestError::InvalidContentLength)?;
        if length.is_some_and(|prev| prev != n) {
            return Err(RequestError::InvalidContentLength);
        }
        length = Some(n);
    }
    Ok(match length {
        None | Some(0) => BodyFraming::Empty,
        Some(n) => BodyFraming::Length(n),
    })
}

fn expects_continue(head: &RequestHead) -> bool {
    head.version == Version::HTTP_11
        && head
            .headers
            .get(header::EXPECT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
}

/// Reads one request from the client connection.
///
/// CONNECT requests get an empty body and leave everything after the head
/// buffered in `reader`. Returns `None` if the client sent nothing.
pub async fn read_request<S>(
    reader: &mut Prebuffered<S>,
    peer_addr: Option<SocketAddr>,
    limits: &LimitsConfig,
) -> Result<Option<ClientRequest>, RequestError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(mut head) = RequestHead::read(reader, limits.max_header_bytes).await? else {
        return Ok(None);
    };

    let body = if head.method == Method::CONNECT {
        Bytes::new()
    } else {
        let framing = body_framing(&head.headers)?;
        if let BodyFraming::Length(n) = framing {
            if n > limits.max_body_bytes {
                return Err(RequestError::BodyTooLarge(limits.max_body_bytes));
            }
        }
        if framing != BodyFraming::Empty && expects_continue(&head) {
            reader.get_mut().write_all(CONTINUE).await?;
            reader.get_mut().flush().await?;
        }
        head.headers.remove(header::EXPECT);
        match framing {
            BodyFraming::Empty => Bytes::new(),
            BodyFraming::Length(n) => read_exact_body(reader, n).await?,
            BodyFraming::Chunked => read_chunked_body(reader, limits.max_body_bytes).await?,
        }
    };

    Ok(Some(ClientRequest {
        method: head.method,
        target: head.target,
        uri: head.uri,
        version: head.version,
        headers: head.headers,
        body,
        peer_addr,
    }))
}

async fn read_exact_body<S: AsyncRead + Unpin>(
    reader: &mut Prebuffered<S>,
    len: usize,
) -> Result<Bytes, RequestError> {
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}

async fn read_chunked_body<S: AsyncRead + Unpin>(
    reader: &mut Prebuffered<S>,
    max_len: usize,
) -> Result<Bytes, RequestError> {
    let mut body = BytesMut::new();
    loop {
        let line = reader.read_line().await?;
        let size = chunk_size(&line)?;
        if size == 0 {
            break;
        }
        if body.len().saturating_add(size) > max_len {
            return Err(RequestError::BodyTooLarge(max_len));
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..]).await?;
        if !reader.read_line().await?.is_empty() {
            return Err(RequestError::InvalidChunk("missing CRLF after chunk data"));
        }
    }
    // Trailer fields are hop-by-hop and dropped.
    while !reader.read_line().await?.is_empty() {}
    Ok(body.freeze())
}

/// Parses a chunk-size line, ignoring chunk extensions.
fn chunk_size(line: &[u8]) -> Result<usize, RequestError> {
    let line =
        std::str::from_utf8(line).map_err(|_| RequestError::InvalidChunk("non-ASCII chunk size"))?;
    let size = line.split(';').next().unwrap_or("").trim();
    if size.is_empty() {
        return Err(RequestError::InvalidChunk("empty chunk size"));
    }
    usize::from_str_radix(size, 16).map_err(|_| RequestError::InvalidChunk("invalid chunk size"))
}
