//! HTTP upgrade handshake processing (RFC 6455 opening handshake).
//!
//! The handshake processor buffers raw bytes until a complete HTTP request
//! head is available, validates it as a WebSocket upgrade, and produces the
//! `101 Switching Protocols` response. Validation failures synthesize an
//! HTTP error response instead; the connection then closes.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The GUID appended to the client key in the Sec-WebSocket-Accept
/// calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Lowest Sec-WebSocket-Version this engine accepts.
pub const MIN_WEBSOCKET_VERSION: u32 = 8;

const BASE64_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/";

/// Locate the end of the HTTP header block (the CRLFCRLF terminator).
///
/// Returns the offset one past the terminator, i.e. where the byte stream
/// beyond the head begins. `None` means the head is still incomplete and
/// nothing may be consumed.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// A parsed HTTP request head: request line plus headers.
///
/// Headers keep their arrival order and original spelling; lookup is
/// ASCII-case-insensitive on the name and later duplicates win over
/// earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequestHead {
    /// Request method token.
    pub method: String,
    /// Request target (the path of the upgrade request).
    pub target: String,
    /// Version token, e.g. `HTTP/1.1`.
    pub version: String,
    headers: Vec<(String, String)>,
}

impl HttpRequestHead {
    /// Parse a complete header block (everything before the CRLFCRLF
    /// terminator, which must already have been located).
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedRequestLine`] unless the request line has
    ///   exactly three space-separated tokens.
    /// - [`Error::UnsupportedMethod`] for any method other than `GET`.
    /// - [`Error::UnsupportedHttpVersion`] unless the version is
    ///   `HTTP/1.1`.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(head);
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default().trim();
        let tokens: Vec<&str> = request_line.split(' ').collect();
        if tokens.len() != 3 {
            return Err(Error::MalformedRequestLine(request_line.to_string()));
        }
        if tokens[0] != "GET" {
            return Err(Error::UnsupportedMethod(tokens[0].to_string()));
        }
        match tokens[2].split_once('/') {
            Some(("HTTP", "1.1")) => {}
            _ => return Err(Error::UnsupportedHttpVersion(tokens[2].to_string())),
        }

        let mut headers = Vec::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                if !name.is_empty() {
                    headers.push((name.trim().to_string(), value.trim().to_string()));
                }
            }
        }

        Ok(Self {
            method: tokens[0].to_string(),
            target: tokens[1].to_string(),
            version: tokens[2].to_string(),
            headers,
        })
    }

    /// Look up a header value by name, case-insensitively, last-wins.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A validated WebSocket upgrade request, projected out of the HTTP head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The Host header value, as sent.
    pub host: String,
    /// The request target.
    pub target: String,
    /// Trimmed Sec-WebSocket-Origin value, if present.
    pub origin: Option<String>,
    /// Offered sub-protocols in arrival order, comma-split, untrimmed.
    pub protocols: Vec<String>,
    /// Parsed Sec-WebSocket-Version.
    pub version: u32,
    /// The Sec-WebSocket-Key token.
    pub key: String,
}

impl HandshakeRequest {
    /// Validate an HTTP request head as a WebSocket upgrade.
    ///
    /// Checks run in a fixed order and fail fast on the first violation.
    ///
    /// # Errors
    ///
    /// [`Error::MissingHeader`], [`Error::InvalidHeaderValue`],
    /// [`Error::UnsupportedWebSocketVersion`] or
    /// [`Error::InvalidKeyEncoding`]; all answered with HTTP 400.
    pub fn from_head(head: &HttpRequestHead) -> Result<Self> {
        let host = head
            .header("Host")
            .ok_or(Error::MissingHeader("Host"))?
            .to_string();

        let upgrade = head.header("Upgrade").ok_or(Error::MissingHeader("Upgrade"))?;
        if upgrade != "websocket" {
            return Err(Error::InvalidHeaderValue {
                header: "Upgrade",
                reason: format!("expected 'websocket', got {upgrade:?}"),
            });
        }

        let connection = head
            .header("Connection")
            .ok_or(Error::MissingHeader("Connection"))?;
        if !connection.split(',').any(|token| token.trim() == "Upgrade") {
            return Err(Error::InvalidHeaderValue {
                header: "Connection",
                reason: "does not include the 'Upgrade' token".to_string(),
            });
        }

        let version_str = head
            .header("Sec-WebSocket-Version")
            .ok_or(Error::MissingHeader("Sec-WebSocket-Version"))?;
        let version: u32 = version_str
            .parse()
            .map_err(|_| Error::InvalidHeaderValue {
                header: "Sec-WebSocket-Version",
                reason: format!("not an integer: {version_str:?}"),
            })?;
        if version < MIN_WEBSOCKET_VERSION {
            return Err(Error::UnsupportedWebSocketVersion(version));
        }

        // Offered sub-protocols: comma-split verbatim, no trimming.
        let protocols = head
            .header("Sec-WebSocket-Protocol")
            .map(|p| p.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        let origin = head
            .header("Sec-WebSocket-Origin")
            .map(|o| o.trim().to_string());

        // Sec-WebSocket-Extensions is read but not negotiated.
        let _ = head.header("Sec-WebSocket-Extensions");

        let key = head
            .header("Sec-WebSocket-Key")
            .ok_or(Error::MissingHeader("Sec-WebSocket-Key"))?
            .to_string();
        validate_key(&key)?;

        Ok(Self {
            host,
            target: head.target.clone(),
            origin,
            protocols,
            version,
            key,
        })
    }
}

/// Check the Sec-WebSocket-Key shape: exactly 24 characters, the first 22
/// from the base64 alphabet, ending in `==` (a 16-byte value).
fn validate_key(key: &str) -> Result<()> {
    let bytes = key.as_bytes();
    if bytes.len() != 24 || !key.ends_with("==") {
        return Err(Error::InvalidKeyEncoding(key.to_string()));
    }
    if !bytes[..22].iter().all(|b| BASE64_ALPHABET.contains(b)) {
        return Err(Error::InvalidKeyEncoding(key.to_string()));
    }
    Ok(())
}

/// Compute the Sec-WebSocket-Accept token: `base64(SHA-1(key ++ GUID))`.
///
/// # Example
///
/// ```
/// use wsengine::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Serialize the `101 Switching Protocols` response.
///
/// The protocol header is emitted only when a sub-protocol was negotiated.
#[must_use]
pub fn accept_response(accept: &str, protocol: Option<&str>) -> Vec<u8> {
    let mut response = String::from("HTTP/1.1 101 Switching Protocols\r\n");
    response.push_str("Upgrade: websocket\r\n");
    response.push_str("Connection: Upgrade\r\n");
    response.push_str(&format!("Sec-WebSocket-Accept: {accept}\r\n"));
    if let Some(protocol) = protocol {
        response.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
    }
    response.push_str("\r\n");
    response.into_bytes()
}

/// Serialize an HTTP error response for a failed handshake.
///
/// Returns `None` for errors outside the handshake-rejection class.
#[must_use]
pub fn error_response(err: &Error) -> Option<Vec<u8>> {
    let code = err.http_status()?;
    let reason = match err {
        Error::HandshakeRejected { reason, .. } => reason.as_str(),
        _ => "Bad Request",
    };
    Some(format!("HTTP/1.1 {code} {reason}\r\n\r\n").into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn sample_head() -> Vec<u8> {
        b"GET /chat HTTP/1.1\r\n\
          Host: server.example.com\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
          Sec-WebSocket-Version: 13\r\n"
            .to_vec()
    }

    fn validated(head: &[u8]) -> Result<HandshakeRequest> {
        HandshakeRequest::from_head(&HttpRequestHead::parse(head)?)
    }

    #[test]
    fn test_accept_key_rfc_example() {
        // RFC 6455 section 1.3 worked example.
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_find_head_end() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\n"), Some(18));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nrest"), Some(18));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(find_head_end(b""), None);
    }

    #[test]
    fn test_parse_valid_request() {
        let mut head = sample_head();
        head.extend_from_slice(
            b"Sec-WebSocket-Protocol: chat, superchat\r\n\
              Sec-WebSocket-Origin: http://example.com\r\n",
        );
        let req = validated(&head).unwrap();
        assert_eq!(req.host, "server.example.com");
        assert_eq!(req.target, "/chat");
        assert_eq!(req.key, SAMPLE_KEY);
        assert_eq!(req.version, 13);
        assert_eq!(req.origin.as_deref(), Some("http://example.com"));
        // Comma-split without trimming keeps the space.
        assert_eq!(req.protocols, vec!["chat", " superchat"]);
    }

    #[test]
    fn test_no_protocols_means_empty_list() {
        let req = validated(&sample_head()).unwrap();
        assert!(req.protocols.is_empty());
        assert_eq!(req.origin, None);
    }

    #[test]
    fn test_request_line_must_have_three_tokens() {
        let head = b"GET /chat\r\nHost: x\r\n";
        assert!(matches!(
            validated(head),
            Err(Error::MalformedRequestLine(_))
        ));
    }

    #[test]
    fn test_method_must_be_get() {
        let head = b"POST /chat HTTP/1.1\r\nHost: x\r\n";
        assert!(matches!(
            validated(head),
            Err(Error::UnsupportedMethod(m)) if m == "POST"
        ));
    }

    #[test]
    fn test_version_must_be_1_1() {
        let head = b"GET /chat HTTP/1.0\r\nHost: x\r\n";
        assert!(matches!(
            validated(head),
            Err(Error::UnsupportedHttpVersion(v)) if v == "HTTP/1.0"
        ));
    }

    #[test]
    fn test_missing_required_headers() {
        for (drop, expected) in [
            ("Host", "Host"),
            ("Upgrade", "Upgrade"),
            ("Connection", "Connection"),
            ("Sec-WebSocket-Version", "Sec-WebSocket-Version"),
            ("Sec-WebSocket-Key", "Sec-WebSocket-Key"),
        ] {
            let head: Vec<u8> = String::from_utf8(sample_head())
                .unwrap()
                .lines()
                .filter(|line| !line.starts_with(&format!("{drop}:")))
                .flat_map(|line| format!("{line}\r\n").into_bytes())
                .collect();
            assert!(
                matches!(validated(&head), Err(Error::MissingHeader(h)) if h == expected),
                "dropping {drop}"
            );
        }
    }

    #[test]
    fn test_upgrade_value_is_exact() {
        let head = sample_head();
        let head = String::from_utf8(head)
            .unwrap()
            .replace("Upgrade: websocket", "Upgrade: WebSocket");
        assert!(matches!(
            validated(head.as_bytes()),
            Err(Error::InvalidHeaderValue {
                header: "Upgrade",
                ..
            })
        ));
    }

    #[test]
    fn test_connection_header_token_list() {
        let head = String::from_utf8(sample_head())
            .unwrap()
            .replace("Connection: Upgrade", "Connection: keep-alive, Upgrade");
        assert!(validated(head.as_bytes()).is_ok());

        let head = String::from_utf8(sample_head())
            .unwrap()
            .replace("Connection: Upgrade", "Connection: keep-alive");
        assert!(matches!(
            validated(head.as_bytes()),
            Err(Error::InvalidHeaderValue {
                header: "Connection",
                ..
            })
        ));
    }

    #[test]
    fn test_websocket_version_bounds() {
        let ok = String::from_utf8(sample_head())
            .unwrap()
            .replace("Version: 13", "Version: 8");
        assert_eq!(validated(ok.as_bytes()).unwrap().version, 8);

        let low = String::from_utf8(sample_head())
            .unwrap()
            .replace("Version: 13", "Version: 7");
        assert!(matches!(
            validated(low.as_bytes()),
            Err(Error::UnsupportedWebSocketVersion(7))
        ));

        let junk = String::from_utf8(sample_head())
            .unwrap()
            .replace("Version: 13", "Version: pineapple");
        assert!(matches!(
            validated(junk.as_bytes()),
            Err(Error::InvalidHeaderValue {
                header: "Sec-WebSocket-Version",
                ..
            })
        ));
    }

    #[test]
    fn test_key_shape_validation() {
        // Wrong length.
        assert!(validate_key("c2hvcnQ=").is_err());
        // Right length, missing the == suffix.
        assert!(validate_key("dGhlIHNhbXBsZSBub25jZVE=").is_err());
        // Character outside the base64 alphabet.
        assert!(validate_key("dGhlIHNhbXBsZSBub25jZ!==").is_err());
        assert!(validate_key(SAMPLE_KEY).is_ok());
    }

    #[test]
    fn test_header_lookup_case_insensitive_last_wins() {
        let head = HttpRequestHead::parse(
            b"GET / HTTP/1.1\r\n\
              HOST: first.example\r\n\
              host: second.example\r\n",
        )
        .unwrap();
        assert_eq!(head.header("Host"), Some("second.example"));
    }

    #[test]
    fn test_accept_response_bytes() {
        let response = accept_response("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=", Some("chat"));
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(text.contains("Sec-WebSocket-Protocol: chat\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_accept_response_without_protocol() {
        let response = accept_response("abc=", None);
        let text = String::from_utf8(response).unwrap();
        assert!(!text.contains("Sec-WebSocket-Protocol"));
    }

    #[test]
    fn test_error_responses() {
        let bad = error_response(&Error::MissingHeader("Host")).unwrap();
        assert_eq!(bad, b"HTTP/1.1 400 Bad Request\r\n\r\n");

        let rejected = error_response(&Error::HandshakeRejected {
            code: 403,
            reason: "Forbidden".into(),
        })
        .unwrap();
        assert_eq!(rejected, b"HTTP/1.1 403 Forbidden\r\n\r\n");

        assert!(error_response(&Error::UnmaskedFrame).is_none());
    }
}
