use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH};
use http::{HeaderMap, Request, Response, Version};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Errors of the HTTP wire layer
#[derive(Debug, thiserror::Error)]
pub enum HttpdError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    Parse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("incomplete request")]
    IncompleteRequest,
}

/// Custom reason phrase carried through [`http::Response`] extensions
///
/// The `http` crate's response type has no slot for a reason phrase, so the
/// writer looks for this extension before falling back to the status code's
/// canonical reason.
#[derive(Debug, Clone)]
pub struct ReasonPhrase(String);

impl ReasonPhrase {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reads one HTTP/1.1 request from the stream
///
/// Accumulates bytes until `httparse` reports complete headers, then reads
/// the declared `Content-Length` worth of body. Returns `Ok(None)` on a
/// clean end-of-stream between requests (the client closed a keep-alive
/// connection).
pub async fn read_request(
    stream: &mut TcpStream,
    buffer_size: usize,
    max_request_size: usize,
) -> Result<Option<Request<Bytes>>, HttpdError> {
    let mut buffer = BytesMut::with_capacity(buffer_size);
    let mut chunk = vec![0u8; buffer_size];

    loop {
        if buffer.len() > max_request_size {
            return Err(HttpdError::TooLarge {
                limit: max_request_size,
            });
        }

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut parsed = httparse::Request::new(&mut headers);
        match parsed.parse(&buffer) {
            Ok(httparse::Status::Complete(header_len)) => {
                let method = parsed
                    .method
                    .ok_or_else(|| HttpdError::Parse("missing method".to_string()))?
                    .to_string();
                let path = parsed
                    .path
                    .ok_or_else(|| HttpdError::Parse("missing path".to_string()))?
                    .to_string();
                let version = match parsed.version {
                    Some(0) => Version::HTTP_10,
                    _ => Version::HTTP_11,
                };

                let mut header_map = HeaderMap::new();
                for header in parsed.headers.iter() {
                    let name = http::header::HeaderName::from_bytes(header.name.as_bytes())
                        .map_err(|e| HttpdError::Parse(e.to_string()))?;
                    let value = http::header::HeaderValue::from_bytes(header.value)
                        .map_err(|e| HttpdError::Parse(e.to_string()))?;
                    header_map.append(name, value);
                }

                let content_length = match header_map.get(CONTENT_LENGTH) {
                    Some(value) => value
                        .to_str()
                        .ok()
                        .and_then(|v| v.parse::<usize>().ok())
                        .ok_or_else(|| {
                            HttpdError::InvalidRequest("bad Content-Length".to_string())
                        })?,
                    None => 0,
                };
                if header_len + content_length > max_request_size {
                    return Err(HttpdError::TooLarge {
                        limit: max_request_size,
                    });
                }

                // Headers are done; pull in the rest of the body.
                while buffer.len() < header_len + content_length {
                    let n = stream.read(&mut chunk).await?;
                    if n == 0 {
                        return Err(HttpdError::IncompleteRequest);
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                }

                let body =
                    Bytes::copy_from_slice(&buffer[header_len..header_len + content_length]);
                let mut request = Request::builder()
                    .method(method.as_str())
                    .uri(path)
                    .version(version)
                    .body(body)
                    .map_err(|e| HttpdError::Parse(e.to_string()))?;
                *request.headers_mut() = header_map;
                return Ok(Some(request));
            }
            Ok(httparse::Status::Partial) => {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    return Err(HttpdError::IncompleteRequest);
                }
                buffer.extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                return Err(HttpdError::Parse(format!("failed to parse headers: {e}")));
            }
        }
    }
}

/// Whether the connection should stay open after this request
pub fn keep_alive(request: &Request<Bytes>) -> bool {
    let wants_close = request
        .headers()
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("close"))
        .unwrap_or(false);
    request.version() == Version::HTTP_11 && !wants_close
}

/// Writes one HTTP/1.1 response to the stream
///
/// `Content-Length` is set from the body. A [`ReasonPhrase`] extension
/// overrides the status code's canonical reason on the status line.
pub async fn write_response(
    stream: &mut TcpStream,
    response: &Response<Vec<u8>>,
) -> Result<(), HttpdError> {
    let status = response.status();
    let reason = response
        .extensions()
        .get::<ReasonPhrase>()
        .map(ReasonPhrase::as_str)
        .or_else(|| status.canonical_reason())
        .unwrap_or("Unspecified");

    let mut head = format!("HTTP/1.1 {} {}\r\n", status.as_u16(), reason);
    for (name, value) in response.headers() {
        if *name == CONTENT_LENGTH {
            continue;
        }
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(String::from_utf8_lossy(value.as_bytes()).as_ref());
        head.push_str("\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", response.body().len()));

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(response.body()).await?;
    stream.flush().await?;
    Ok(())
}
