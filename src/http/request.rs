//! HTTP/1.1 request parsing using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },

    #[error("request body exceeds maximum allowed size of {max_bytes} bytes")]
    BodyTooLarge { max_bytes: usize },

    #[error("request head exceeds maximum allowed size of {max_bytes} bytes")]
    HeadTooLarge { max_bytes: usize },

    #[error("unsupported Transfer-Encoding: {value:?}")]
    UnsupportedTransferEncoding { value: String },

    #[error("malformed chunked body")]
    InvalidChunk,
}

/// A fully parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer once the headers and
/// the whole `Content-Length` body have arrived.
///
/// # Examples
///
/// ```
/// use multilab::http::request::Request;
///
/// let raw = b"POST /api/chat HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\n\r\n{}";
/// let (request, consumed) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "POST");
/// assert_eq!(request.path(), "/api/chat");
/// assert_eq!(request.body().as_ref(), b"{}");
/// assert_eq!(consumed, raw.len());
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Largest body accepted; chat transcripts are resent in full, so this is
    /// generous.
    pub const MAX_BODY: usize = 8 * 1024 * 1024;

    /// Largest request line plus headers accepted.
    pub const MAX_HEAD: usize = 64 * 1024;

    /// Parse one HTTP/1.1 request from the front of `buf`.
    ///
    /// Returns the request and the number of bytes it occupied (headers plus
    /// body), so the caller can drop exactly that much from its buffer and
    /// keep any pipelined bytes that follow.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — headers or body not fully received yet.
    /// - [`RequestError::Parse`] — the data is malformed.
    /// - [`RequestError::MissingField`] — method, path, or version is absent.
    /// - [`RequestError::InvalidContentLength`] — `Content-Length` is not a number.
    /// - [`RequestError::BodyTooLarge`] — body exceeds [`Self::MAX_BODY`].
    /// - [`RequestError::HeadTooLarge`] — no end of headers within [`Self::MAX_HEAD`].
    /// - [`RequestError::UnsupportedTransferEncoding`] — a coding other than `chunked`.
    /// - [`RequestError::InvalidChunk`] — chunked framing is broken.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) if offset > Self::MAX_HEAD => {
                return Err(RequestError::HeadTooLarge {
                    max_bytes: Self::MAX_HEAD,
                });
            }
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial if buf.len() > Self::MAX_HEAD => {
                return Err(RequestError::HeadTooLarge {
                    max_bytes: Self::MAX_HEAD,
                });
            }
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req.method {
            Some(m) => m.parse().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        // Query strings carry nothing for this service; keep only the path.
        let path = raw_path
            .split_once('?')
            .map_or(raw_path, |(path, _)| path)
            .to_owned();

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.append(header.name, value);
            }
        }

        let (body, consumed) = match header_map.get("transfer-encoding") {
            Some(coding) if coding.trim().eq_ignore_ascii_case("chunked") => {
                decode_chunked(buf, body_offset)?
            }
            Some(coding) => {
                return Err(RequestError::UnsupportedTransferEncoding {
                    value: coding.to_owned(),
                });
            }
            None => {
                let content_length = match header_map.get("content-length") {
                    Some(value) => value.trim().parse::<usize>().map_err(|_| {
                        RequestError::InvalidContentLength {
                            value: value.to_owned(),
                        }
                    })?,
                    None => 0,
                };
                if content_length > Self::MAX_BODY {
                    return Err(RequestError::BodyTooLarge {
                        max_bytes: Self::MAX_BODY,
                    });
                }

                let consumed = body_offset + content_length;
                if buf.len() < consumed {
                    return Err(RequestError::Incomplete);
                }
                (Bytes::copy_from_slice(&buf[body_offset..consumed]), consumed)
            }
        };

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                body,
            },
            consumed,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }
}

/// Decodes a chunked body starting at `start`, returning the body and the
/// offset just past the final CRLF. Trailer fields are skipped.
fn decode_chunked(buf: &[u8], start: usize) -> Result<(Bytes, usize), RequestError> {
    let mut body = Vec::new();
    let mut pos = start;

    loop {
        let (size_len, size) = match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Err(RequestError::Incomplete),
            Err(_) => return Err(RequestError::InvalidChunk),
        };
        pos += size_len;

        if size == 0 {
            // Trailers count against the same limit as the head.
            let trailers_start = pos;
            loop {
                let Some(line_len) = buf[pos..].windows(2).position(|w| w == b"\r\n") else {
                    return Err(if buf.len() - trailers_start > Request::MAX_HEAD {
                        RequestError::HeadTooLarge {
                            max_bytes: Request::MAX_HEAD,
                        }
                    } else {
                        RequestError::Incomplete
                    });
                };
                pos += line_len + 2;
                if line_len == 0 {
                    return Ok((Bytes::from(body), pos));
                }
                if pos - trailers_start > Request::MAX_HEAD {
                    return Err(RequestError::HeadTooLarge {
                        max_bytes: Request::MAX_HEAD,
                    });
                }
            }
        }

        let size = usize::try_from(size)
            .ok()
            .filter(|size| *size <= Request::MAX_BODY - body.len())
            .ok_or(RequestError::BodyTooLarge {
                max_bytes: Request::MAX_BODY,
            })?;
        let data_end = pos + size;
        if buf.len() < data_end + 2 {
            return Err(RequestError::Incomplete);
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Err(RequestError::InvalidChunk);
        }
        body.extend_from_slice(&buf[pos..data_end]);
        pos = data_end + 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET /api/health HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, consumed) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/api/health");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert!(req.body().is_empty());
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn query_string_is_dropped_from_path() {
        let raw = b"GET /api/health?probe=1 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/api/health");
    }

    #[test]
    fn incomplete_headers() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn incomplete_body() {
        let raw = b"POST /api/chat HTTP/1.1\r\nContent-Length: 10\r\n\r\n{\"a\"";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn pipelined_bytes_are_not_part_of_the_body() {
        let raw = b"POST /api/chat HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n\r\n";
        let (req, consumed) = Request::parse(raw).unwrap();
        assert_eq!(req.body().as_ref(), b"hello");
        assert_eq!(&raw[consumed..], b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn bad_content_length() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
        assert!(matches!(
            Request::parse(raw),
            Err(RequestError::InvalidContentLength { .. })
        ));
    }

    #[test]
    fn oversized_body_is_rejected_from_the_header_alone() {
        let raw = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            Request::MAX_BODY + 1
        );
        assert!(matches!(
            Request::parse(raw.as_bytes()),
            Err(RequestError::BodyTooLarge { .. })
        ));
    }

    const CHUNKED_CHAT: &[u8] = b"POST /api/chat HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
        a\r\n{\"model\":\"\r\n\
        30\r\nm1\",\"messages\":[{\"role\":\"user\",\"content\":\"hi\"}]}\r\n\
        0\r\n\r\n";

    #[test]
    fn chunked_body_is_decoded() {
        let (req, consumed) = Request::parse(CHUNKED_CHAT).unwrap();
        assert_eq!(
            req.body().as_ref(),
            br#"{"model":"m1","messages":[{"role":"user","content":"hi"}]}"#
        );
        assert_eq!(consumed, CHUNKED_CHAT.len());
    }

    #[test]
    fn chunked_body_keeps_following_request_intact() {
        let mut raw = CHUNKED_CHAT.to_vec();
        raw.extend_from_slice(b"GET /api/health HTTP/1.1\r\n\r\n");
        let (_, consumed) = Request::parse(&raw).unwrap();
        let (next, _) = Request::parse(&raw[consumed..]).unwrap();
        assert_eq!(next.path(), "/api/health");
    }

    #[test]
    fn chunked_trailers_are_skipped() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2;ext=1\r\nok\r\n0\r\nX-Sum: 1\r\n\r\n";
        let (req, consumed) = Request::parse(raw).unwrap();
        assert_eq!(req.body().as_ref(), b"ok");
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn partial_chunked_body_is_incomplete() {
        for cut in [CHUNKED_CHAT.len() - 2, CHUNKED_CHAT.len() - 6, 80] {
            assert!(
                matches!(
                    Request::parse(&CHUNKED_CHAT[..cut]),
                    Err(RequestError::Incomplete)
                ),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn endless_trailers_are_rejected() {
        let mut raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\nX-Junk: ".to_vec();
        raw.resize(raw.len() + Request::MAX_HEAD, b'a');
        assert!(matches!(
            Request::parse(&raw),
            Err(RequestError::HeadTooLarge { .. })
        ));
    }

    #[test]
    fn broken_chunk_framing_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nokay\r\n0\r\n\r\n";
        assert!(matches!(Request::parse(raw), Err(RequestError::InvalidChunk)));
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n";
        assert!(matches!(Request::parse(raw), Err(RequestError::InvalidChunk)));
    }

    #[test]
    fn other_transfer_codings_are_rejected() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n";
        assert!(matches!(
            Request::parse(raw),
            Err(RequestError::UnsupportedTransferEncoding { .. })
        ));
    }

    #[test]
    fn endless_head_is_rejected() {
        let mut raw = b"POST /api/chat HTTP/1.1\r\nX-Junk: ".to_vec();
        raw.resize(Request::MAX_HEAD + 1, b'a');
        assert!(matches!(
            Request::parse(&raw),
            Err(RequestError::HeadTooLarge { .. })
        ));
        raw.truncate(Request::MAX_HEAD);
        assert!(matches!(Request::parse(&raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn keep_alive_rules() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(req.is_keep_alive());

        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());

        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
    }
}
