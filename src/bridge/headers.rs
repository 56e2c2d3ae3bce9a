//! Hop-by-hop header sanitizing.
//!
//! # Responsibilities
//! - Strip the static hop-by-hop headers in both forwarding directions
//! - Strip every header named by the `Connection` header
//! - Preserve order and multiplicity of everything else
//!
//! # Design Decisions
//! - Header names compare case-insensitively (`http::HeaderName` is lowercase)
//! - Malformed `Connection` tokens are skipped, never fatal
//! - Token grammar is a character-class check, no regex

use std::collections::HashSet;

use http::header::{self, HeaderMap, HeaderName};

/// Headers that are never forwarded, whatever the `Connection` header says.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHORIZATION,
    HeaderName::from_static("proxy-authentication"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Returns true if `name` is in the static hop-by-hop set.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Returns true if `s` matches the HTTP token grammar (RFC 9110 §5.6.2).
pub fn is_token(s: impl AsRef<[u8]>) -> bool {
    let s = s.as_ref();
    !s.is_empty() && s.iter().copied().all(is_tchar)
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !first.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}

/// Header names listed in a `Connection` header.
#[derive(Debug, Default)]
pub struct ConnectionTokens {
    /// Valid tokens, normalized to header names.
    pub drop: HashSet<HeaderName>,
    /// Tokens that failed the token grammar, as received.
    pub rejected: Vec<String>,
}

impl ConnectionTokens {
    /// Collects the tokens of every `Connection` value in `headers`.
    ///
    /// Values are split as raw bytes, so a non-ASCII token only rejects
    /// itself.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut tokens = Self::default();
        for value in headers.get_all(header::CONNECTION) {
            for part in value.as_bytes().split(|&b| b == b',') {
                tokens.add(trim_ascii(part));
            }
        }
        tokens
    }

    fn add(&mut self, token: &[u8]) {
        let name = is_token(token)
            .then(|| HeaderName::from_bytes(token).ok())
            .flatten();
        match name {
            Some(name) => {
                self.drop.insert(name);
            }
            None => self
                .rejected
                .push(String::from_utf8_lossy(token).into_owned()),
        }
    }

    fn contains(&self, name: &HeaderName) -> bool {
        self.drop.contains(name)
    }
}

/// Appends every end-to-end header of `src` to `dst`.
///
/// Headers in the static hop-by-hop set and headers named by `src`'s
/// `Connection` header are skipped. Existing values in `dst` are kept.
/// Returns the `Connection` tokens that were rejected as malformed.
pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) -> Vec<String> {
    let tokens = ConnectionTokens::from_headers(src);
    // `Connection` is itself hop-by-hop, so it is dropped with the others.
    for (name, value) in src.iter() {
        if is_hop_by_hop(name) || tokens.contains(name) {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
    if !tokens.rejected.is_empty() {
        tracing::debug!(rejected = ?tokens.rejected, "Ignoring malformed Connection tokens");
    }
    tokens.rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn static_set_is_never_copied() {
        let src = headers(&[
            ("connection", "close"),
            ("keep-alive", "timeout=5"),
            ("proxy-authorization", "Basic Zm9vOmJhcg=="),
            ("proxy-authentication", "x"),
            ("te", "trailers"),
            ("trailer", "Expires"),
            ("transfer-encoding", "chunked"),
            ("upgrade", "websocket"),
            ("accept", "*/*"),
        ]);
        let mut dst = HeaderMap::new();
        copy_headers(&mut dst, &src);

        for name in HOP_BY_HOP.iter() {
            assert!(!dst.contains_key(name), "{name} leaked");
        }
        assert_eq!(dst.get("accept").unwrap(), "*/*");
        assert_eq!(dst.len(), 1);
    }

    #[test]
    fn connection_tokens_are_dropped() {
        let src = headers(&[
            ("connection", "X-Foo, X-Bar"),
            ("x-foo", "1"),
            ("x-bar", "2"),
            ("x-baz", "3"),
        ]);
        let mut dst = HeaderMap::new();
        copy_headers(&mut dst, &src);

        assert!(!dst.contains_key("x-foo"));
        assert!(!dst.contains_key("x-bar"));
        assert!(!dst.contains_key(header::CONNECTION));
        assert_eq!(dst.get("x-baz").unwrap(), "3");
    }

    #[test]
    fn tokens_from_repeated_connection_headers() {
        let src = headers(&[
            ("connection", "x-one"),
            ("connection", "x-two"),
            ("x-one", "1"),
            ("x-two", "2"),
            ("host", "example.com"),
        ]);
        let mut dst = HeaderMap::new();
        copy_headers(&mut dst, &src);

        assert_eq!(dst.len(), 1);
        assert!(dst.contains_key(header::HOST));
    }

    #[test]
    fn malformed_token_does_not_block_valid_ones() {
        let src = headers(&[
            ("connection", "x-valid, bad token, x-other"),
            ("x-valid", "1"),
            ("x-other", "2"),
            ("bad", "3"),
        ]);
        let mut dst = HeaderMap::new();
        let rejected = copy_headers(&mut dst, &src);

        assert_eq!(rejected, vec!["bad token".to_string()]);
        assert!(!dst.contains_key("x-valid"));
        assert!(!dst.contains_key("x-other"));
        assert_eq!(dst.get("bad").unwrap(), "3");
    }

    #[test]
    fn non_ascii_token_does_not_block_valid_ones() {
        let mut src = headers(&[("x-foo", "secret"), ("x-keep", "1")]);
        src.append(
            header::CONNECTION,
            HeaderValue::from_bytes(b"x-foo, b\xe4r").unwrap(),
        );
        let mut dst = HeaderMap::new();
        let rejected = copy_headers(&mut dst, &src);

        assert!(!dst.contains_key("x-foo"));
        assert_eq!(dst.get("x-keep").unwrap(), "1");
        assert_eq!(rejected, vec!["b\u{fffd}r".to_string()]);
    }

    #[test]
    fn control_character_token_is_rejected() {
        let src = headers(&[("connection", "x-a\tb, x-c"), ("x-c", "1")]);
        let tokens = ConnectionTokens::from_headers(&src);

        assert_eq!(tokens.rejected, vec!["x-a\tb".to_string()]);
        assert!(tokens.drop.contains(&HeaderName::from_static("x-c")));
    }

    #[test]
    fn empty_tokens_are_rejected() {
        let tokens = ConnectionTokens::from_headers(&headers(&[("connection", "close,")]));
        assert!(tokens.drop.contains(&header::CONNECTION));
        assert_eq!(tokens.rejected, vec![String::new()]);
    }

    #[test]
    fn multi_values_keep_order_and_append() {
        let src = headers(&[("accept", "text/html"), ("accept", "application/json")]);
        let mut dst = headers(&[("accept", "text/plain")]);
        copy_headers(&mut dst, &src);

        let values: Vec<_> = dst.get_all("accept").iter().collect();
        assert_eq!(values, ["text/plain", "text/html", "application/json"]);
    }

    #[test]
    fn token_grammar() {
        assert!(is_token("Keep-Alive"));
        assert!(is_token("x_custom.header~1"));
        assert!(is_token("!#$%&'*+-.^_`|~"));
        assert!(!is_token(""));
        assert!(!is_token("with space"));
        assert!(!is_token("colon:"));
        assert!(!is_token("x\u{7f}"));
        assert!(!is_token("ünïcode"));
    }
}
