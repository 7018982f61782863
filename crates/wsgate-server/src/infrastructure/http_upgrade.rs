//! HTTP/1.1 request-head reading and plain-HTTP responses.
//!
//! Everything before the WebSocket handshake response happens here: the
//! request head is read off the socket, parsed into an [`UpgradeRequest`],
//! and any bytes that arrived after the blank line are kept so the protocol
//! implementation can replay them.
//!
//! Only what admission needs is parsed: the request line and header fields.
//! Bodies are never read.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wsgate_core::UpgradeRequest;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 1024;

/// Errors raised while reading a request head.
#[derive(Debug, Error)]
pub enum HttpUpgradeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection before the head was complete.
    #[error("connection closed after {received} byte(s) of request head")]
    ConnectionClosed { received: usize },

    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("malformed request head: {0}")]
    Malformed(String),
}

/// Position just past the `\r\n\r\n` that ends the head, if present.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// Parses a complete request head (terminator optional) into a request.
///
/// Header names are case-insensitive; a repeated header keeps its last value.
///
/// # Errors
///
/// Returns [`HttpUpgradeError::Malformed`] for non-UTF-8 input, a request
/// line without method, target and version, or a header line without `:`.
pub fn parse_request_head(head: &[u8]) -> Result<UpgradeRequest, HttpUpgradeError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| HttpUpgradeError::Malformed("head is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let request_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| HttpUpgradeError::Malformed("empty request line".into()))?;
    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) => (method, target, version),
        _ => {
            return Err(HttpUpgradeError::Malformed(format!(
                "bad request line: {request_line:?}"
            )))
        }
    };
    if !version.starts_with("HTTP/") {
        return Err(HttpUpgradeError::Malformed(format!(
            "unsupported HTTP version: {version}"
        )));
    }

    let mut request = UpgradeRequest::new(method, target);
    for line in lines.take_while(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpUpgradeError::Malformed(format!("bad header line: {line:?}")))?;
        request.insert_header(name.trim(), value.trim());
    }
    Ok(request)
}

/// Reads from `stream` until a full request head has arrived.
///
/// Returns the parsed request with its `head` set to whatever bytes followed
/// the blank line in the last read.
///
/// # Errors
///
/// See [`HttpUpgradeError`].  `max_head_bytes` bounds the head itself, not
/// the trailing surplus.
pub async fn read_request_head<R>(
    stream: &mut R,
    max_head_bytes: usize,
) -> Result<UpgradeRequest, HttpUpgradeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HttpUpgradeError::ConnectionClosed {
                received: buf.len(),
            });
        }
        // Resume the search just before the new bytes so a terminator split
        // across reads is still found.
        let search_from = buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&buf[search_from..]).map(|e| e + search_from) {
            if end > max_head_bytes {
                return Err(HttpUpgradeError::HeadTooLarge {
                    limit: max_head_bytes,
                });
            }
            let surplus = buf.split_off(end);
            let mut request = parse_request_head(&buf)?;
            request.set_head(surplus);
            return Ok(request);
        }
        if buf.len() > max_head_bytes {
            return Err(HttpUpgradeError::HeadTooLarge {
                limit: max_head_bytes,
            });
        }
    }
}

/// Renders a minimal response with no body.
pub fn response_bytes(status: u16, reason: &str, headers: &[(&str, &str)]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("Connection: close\r\nContent-Length: 0\r\n\r\n");
    out.into_bytes()
}

/// Writes a bodiless response and shuts the write side down.
pub async fn write_response<W>(
    stream: &mut W,
    status: u16,
    reason: &str,
    headers: &[(&str, &str)],
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream
        .write_all(&response_bytes(status, reason, headers))
        .await?;
    stream.shutdown().await
}

/// Answer for requests the admission core refused.
pub async fn write_bad_request<W>(stream: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_response(stream, 400, "Bad Request", &[]).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const UPGRADE_HEAD: &str = "GET /chat?room=1 HTTP/1.1\r\n\
        Host: localhost\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

    #[test]
    fn test_find_head_end_points_past_terminator() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nrest"), Some(18));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n"), None);
    }

    #[test]
    fn test_parse_request_head_extracts_line_and_headers() {
        // Act
        let req = parse_request_head(UPGRADE_HEAD.as_bytes()).expect("parse");

        // Assert
        assert_eq!(req.method(), "GET");
        assert_eq!(req.url(), "/chat?room=1");
        assert_eq!(req.path(), "/chat");
        assert_eq!(req.header("upgrade"), Some("websocket"));
        assert_eq!(req.header("SEC-WEBSOCKET-VERSION"), Some("13"));
    }

    #[test]
    fn test_parse_request_head_rejects_short_request_line() {
        let result = parse_request_head(b"GET /\r\n\r\n");
        assert!(matches!(result, Err(HttpUpgradeError::Malformed(_))));
    }

    #[test]
    fn test_parse_request_head_rejects_header_without_colon() {
        let result = parse_request_head(b"GET / HTTP/1.1\r\nnonsense\r\n\r\n");
        assert!(matches!(result, Err(HttpUpgradeError::Malformed(_))));
    }

    #[test]
    fn test_parse_request_head_rejects_non_http_version() {
        let result = parse_request_head(b"GET / SPDY/3\r\n\r\n");
        assert!(matches!(result, Err(HttpUpgradeError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_read_request_head_keeps_surplus_bytes() {
        // Arrange: head followed by the start of the first frame
        let mut input = UPGRADE_HEAD.as_bytes().to_vec();
        input.extend_from_slice(&[0x81, 0x85]);
        let mut reader = input.as_slice();

        // Act
        let req = read_request_head(&mut reader, 8192).await.expect("read");

        // Assert
        assert_eq!(req.head(), &[0x81, 0x85]);
        assert_eq!(req.header("sec-websocket-key"), Some("dGhlIHNhbXBsZSBub25jZQ=="));
    }

    #[tokio::test]
    async fn test_read_request_head_handles_terminator_split_across_reads() {
        // Arrange: the second read delivers only the final "\r\n"
        let (first, second) = UPGRADE_HEAD.as_bytes().split_at(UPGRADE_HEAD.len() - 2);
        let mut reader = tokio_test::io::Builder::new()
            .read(first)
            .read(second)
            .build();

        // Act
        let req = read_request_head(&mut reader, 8192).await.expect("read");

        // Assert
        assert_eq!(req.url(), "/chat?room=1");
        assert!(req.head().is_empty());
    }

    #[tokio::test]
    async fn test_read_request_head_handles_terminator_split_three_ways() {
        // Arrange: "\r" | "\n\r" | "\n" + surplus, one read each
        let head = UPGRADE_HEAD.as_bytes();
        let n = head.len();
        let mut reader = tokio_test::io::Builder::new()
            .read(&head[..n - 3])
            .read(&head[n - 3..n - 1])
            .read(&[head[n - 1], 0x81])
            .build();

        // Act
        let req = read_request_head(&mut reader, 8192).await.expect("read");

        // Assert
        assert_eq!(req.header("sec-websocket-version"), Some("13"));
        assert_eq!(req.head(), &[0x81]);
    }

    #[tokio::test]
    async fn test_read_request_head_enforces_limit() {
        let mut reader = UPGRADE_HEAD.as_bytes();

        let result = read_request_head(&mut reader, 32).await;

        assert!(matches!(
            result,
            Err(HttpUpgradeError::HeadTooLarge { limit: 32 })
        ));
    }

    #[tokio::test]
    async fn test_read_request_head_reports_early_close() {
        let mut reader: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n";

        let result = read_request_head(&mut reader, 8192).await;

        assert!(matches!(
            result,
            Err(HttpUpgradeError::ConnectionClosed { received: 25 })
        ));
    }

    #[test]
    fn test_response_bytes_layout() {
        let bytes = response_bytes(426, "Upgrade Required", &[("Sec-WebSocket-Version", "13")]);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "HTTP/1.1 426 Upgrade Required\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Connection: close\r\n\
             Content-Length: 0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_write_bad_request_writes_400() {
        let (mut client, mut server) = tokio::io::duplex(256);

        write_bad_request(&mut server).await.expect("write");
        drop(server);
        let mut received = String::new();
        client.read_to_string(&mut received).await.expect("read");

        assert!(received.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }
}
