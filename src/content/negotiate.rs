use crate::content::codec::CodecHandler;
use crate::content::registry::Registry;
use crate::media::{AcceptCharset, AcceptHeader, MediaType};
use http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failures of the negotiation and codec pipeline
///
/// Every variant maps to a protocol status via [`NegotiationError::status`];
/// request handlers recover these at the boundary and translate them to a
/// status plus reason instead of letting them propagate.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// No decoder is registered for the request body's declared type (415)
    #[error("no codec registered for content type {0:?}")]
    UnsupportedMediaType(String),

    /// The decoder rejected the request body (400)
    #[error("failed to decode content body: {0}")]
    DecodeFailure(String),

    /// No registered type satisfies the Accept header (406)
    #[error("no registered content type satisfies {0:?}")]
    NotAcceptable(String),

    /// The negotiated charset label is unknown (406)
    #[error("unsupported charset {0:?}")]
    UnsupportedCharset(String),

    /// The encoder rejected the response value (500)
    #[error("failed to encode response body: {0}")]
    EncodeFailure(String),
}

impl NegotiationError {
    /// The protocol status this failure surfaces as
    pub fn status(&self) -> StatusCode {
        match self {
            NegotiationError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            NegotiationError::DecodeFailure(_) => StatusCode::BAD_REQUEST,
            NegotiationError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            NegotiationError::UnsupportedCharset(_) => StatusCode::NOT_ACCEPTABLE,
            NegotiationError::EncodeFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The reason phrase paired with [`NegotiationError::status`]
    pub fn reason(&self) -> &'static str {
        match self {
            NegotiationError::UnsupportedMediaType(_) => "Unexpected content type",
            NegotiationError::DecodeFailure(_) => "Content body decode failure",
            NegotiationError::NotAcceptable(_) => "Not Acceptable",
            NegotiationError::UnsupportedCharset(_) => "Unsupported charset",
            NegotiationError::EncodeFailure(_) => "Response encoding failure",
        }
    }
}

/// Selects the codec for decoding a request body
///
/// `content_type` is the raw `Content-Type` header value;
/// `application/octet-stream` is assumed when absent. The registered type
/// must match the request's type and subtype exactly, and every parameter on
/// the registered type must be satisfied by the request. Among several
/// matches the one with the most matched parameters wins, then registration
/// order.
pub fn select_for_decoding<'r>(
    registry: &'r Registry,
    content_type: Option<&str>,
) -> Result<(&'r CodecHandler, MediaType), NegotiationError> {
    let header = content_type.unwrap_or("application/octet-stream");
    let requested = MediaType::parse(header)
        .map_err(|_| NegotiationError::UnsupportedMediaType(header.to_string()))?;

    let mut best: Option<&MediaType> = None;
    for candidate in registry.entries() {
        if candidate.kind() != requested.kind() || candidate.subtype() != requested.subtype() {
            continue;
        }
        let satisfied = candidate
            .parameters()
            .iter()
            .all(|(name, value)| requested.parameter(name) == Some(value.as_str()));
        if !satisfied {
            continue;
        }
        if best.is_none_or(|b| candidate.parameters().len() > b.parameters().len()) {
            best = Some(candidate);
        }
    }

    let selected =
        best.ok_or_else(|| NegotiationError::UnsupportedMediaType(header.to_string()))?;
    let handler = registry
        .lookup(selected)
        .ok_or_else(|| NegotiationError::UnsupportedMediaType(header.to_string()))?;
    Ok((handler, requested))
}

/// Decodes a request body with the selected handler
///
/// Charset precedence: the `charset` parameter on the request's own content
/// type, then `charset_override`, then the handler's default encoding.
/// Binary codecs ignore all of them.
pub fn decode_body(
    handler: &CodecHandler,
    body: &[u8],
    content_type: &MediaType,
    charset_override: Option<&str>,
) -> Result<Value, NegotiationError> {
    let charset = content_type.parameter("charset").or(charset_override);
    handler.unpack_bytes(body, charset)
}

/// Selects the codec for encoding a response body
///
/// `accept` is the raw `Accept` header value; `*/*` is assumed when absent.
/// The registered type with the highest quality among matching ranges wins;
/// ties break on range specificity (exact > `type/*` > `*/*`), then on
/// registration order.
pub fn select_for_encoding<'r>(
    registry: &'r Registry,
    accept: Option<&str>,
) -> Result<(&'r CodecHandler, MediaType), NegotiationError> {
    let ranges = match accept {
        Some(header) => AcceptHeader::parse(header),
        None => AcceptHeader::any(),
    };

    let mut best: Option<(&MediaType, f32, (u8, usize))> = None;
    for candidate in registry.entries() {
        let Some((quality, specificity)) = ranges.score(candidate) else {
            continue;
        };
        // Strict comparisons keep the earliest registration on full ties.
        let better = match best {
            None => true,
            Some((_, best_quality, best_specificity)) => {
                quality > best_quality
                    || (quality == best_quality && specificity > best_specificity)
            }
        };
        if better {
            best = Some((candidate, quality, specificity));
        }
    }

    let described = accept.unwrap_or("*/*");
    let selected = best
        .ok_or_else(|| NegotiationError::NotAcceptable(described.to_string()))?
        .0;
    let handler = registry
        .lookup(selected)
        .ok_or_else(|| NegotiationError::NotAcceptable(described.to_string()))?;
    Ok((handler, selected.clone()))
}

/// Encodes a response body with the selected handler
///
/// `accept_charset` is the raw `Accept-Charset` header value, defaulting to
/// `*`. Returns the charset label that was used (absent for binary codecs)
/// and the encoded bytes.
pub fn encode_body(
    handler: &CodecHandler,
    value: &Value,
    accept_charset: Option<&str>,
) -> Result<(Option<String>, Vec<u8>), NegotiationError> {
    let charsets = match accept_charset {
        Some(header) => AcceptCharset::parse(header),
        None => AcceptCharset::any(),
    };
    handler.pack_bytes(value, charsets.preferred())
}
