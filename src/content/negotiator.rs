use crate::content::negotiate::{
    decode_body, encode_body, select_for_decoding, select_for_encoding, NegotiationError,
};
use crate::content::registry::Registry;
use crate::httpd::ReasonPhrase;
use bytes::Bytes;
use http::header::{ACCEPT, ACCEPT_CHARSET, CONTENT_TYPE, VARY};
use http::{HeaderMap, Response, StatusCode};
use serde_json::Value;

/// Per-request content negotiation
///
/// A `ContentNegotiator` binds the shared [`Registry`] to one request's
/// headers and body. Handlers hold one by value and use it to decode the
/// request body on demand and to encode the response according to the
/// client's `Accept` headers. It is cheap to construct and exclusively owned
/// by its request; the only state it accumulates is the memoized decoded
/// body.
///
/// # Examples
///
/// ```
/// use http::HeaderMap;
/// use parley::content::{ContentNegotiator, Registry};
///
/// let mut registry = Registry::new();
/// registry
///     .register_text_type(
///         "application/json",
///         "utf-8",
///         Box::new(|value| Ok(serde_json::to_string(value)?)),
///         Box::new(|text| Ok(serde_json::from_str(text)?)),
///     )
///     .unwrap();
///
/// let headers = HeaderMap::new();
/// let negotiator = ContentNegotiator::new(&registry, &headers, b"");
/// let response = negotiator.send_response(&serde_json::json!({"hi": "there"})).unwrap();
/// assert_eq!(
///     response.headers()["content-type"],
///     "application/json; charset=utf-8"
/// );
/// ```
pub struct ContentNegotiator<'a> {
    registry: &'a Registry,
    headers: &'a HeaderMap,
    body: &'a [u8],
    decoded: Option<Value>,
}

impl<'a> ContentNegotiator<'a> {
    /// Creates a negotiator for one request
    pub fn new(registry: &'a Registry, headers: &'a HeaderMap, body: &'a [u8]) -> Self {
        Self {
            registry,
            headers,
            body,
            decoded: None,
        }
    }

    /// Creates a negotiator from a parsed request
    pub fn from_request(registry: &'a Registry, request: &'a http::Request<Bytes>) -> Self {
        Self::new(registry, request.headers(), request.body())
    }

    /// The decoded request body
    ///
    /// The first call selects a decoder from the registry based on the
    /// request's `Content-Type` and decodes the body; the result is memoized
    /// for the rest of the request lifetime.
    ///
    /// # Errors
    ///
    /// [`NegotiationError::UnsupportedMediaType`] (415) when no registered
    /// type matches, [`NegotiationError::DecodeFailure`] (400) when the
    /// decoder rejects the payload.
    pub fn request_body(&mut self) -> Result<&Value, NegotiationError> {
        let decoded = match self.decoded.take() {
            Some(value) => value,
            None => {
                let content_type = header_str(self.headers, CONTENT_TYPE.as_str());
                let (handler, requested) = select_for_decoding(self.registry, content_type)?;
                decode_body(handler, self.body, &requested, None)?
            }
        };
        Ok(self.decoded.insert(decoded))
    }

    /// Encodes `value` according to the request's `Accept` headers
    ///
    /// The response carries the negotiated `Content-Type`; text codecs get a
    /// `charset` parameter appended on a private copy of the registered type.
    /// Meant to be called once per request; a second call simply builds
    /// another response.
    ///
    /// # Errors
    ///
    /// [`NegotiationError::NotAcceptable`] /
    /// [`NegotiationError::UnsupportedCharset`] (both 406) when the accept
    /// lists cannot be satisfied.
    pub fn send_response(&self, value: &Value) -> Result<Response<Vec<u8>>, NegotiationError> {
        let accept = header_str(self.headers, ACCEPT.as_str());
        let (handler, selected) = select_for_encoding(self.registry, accept)?;

        let accept_charset = header_str(self.headers, ACCEPT_CHARSET.as_str());
        let (charset, bytes) = encode_body(handler, value, accept_charset)?;

        let content_type = match charset {
            Some(label) => selected.with_parameter("charset", &label),
            None => selected,
        };
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, content_type.to_string())
            .body(bytes)
            .map_err(|e| NegotiationError::EncodeFailure(e.to_string()))
    }

    /// Canonical content type strings registered for negotiation
    pub fn registered_content_types(&self) -> impl Iterator<Item = String> + '_ {
        self.registry.registered_types()
    }

    /// Whether the client asked for a transparent negotiation variant list
    ///
    /// True when the `Negotiate` header's list contains `vlist` (RFC 2295).
    pub fn variant_list_requested(&self) -> bool {
        header_str(self.headers, "negotiate")
            .map(|header| {
                header
                    .split(',')
                    .any(|item| item.trim().eq_ignore_ascii_case("vlist"))
            })
            .unwrap_or(false)
    }

    /// Renders the `Alternatives` header for `uri`
    ///
    /// Every registered type is listed as a variant with quality 1.0 and a
    /// `type` property, per the RFC 2295 variant-list syntax.
    pub fn alternatives_header(&self, uri: &str) -> String {
        self.registry
            .registered_types()
            .map(|content_type| format!("{{\"{uri}\" 1.0 {{type {content_type}}}}}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// [`send_response`](Self::send_response) with the RFC 2295 subset
    ///
    /// When the client sent `Negotiate: vlist`, the response additionally
    /// carries `Alternatives` and `TCN: list`. When negotiation fails with
    /// 406, the failure is answered as `300 Multiple Choices` with
    /// `Vary: negotiate, accept` instead of an error.
    pub fn send_negotiated_response(
        &self,
        value: &Value,
        uri: &str,
    ) -> Result<Response<Vec<u8>>, NegotiationError> {
        let alternatives = self
            .variant_list_requested()
            .then(|| self.alternatives_header(uri));

        let mut response = match self.send_response(value) {
            Ok(response) => response,
            Err(error) if error.status() == StatusCode::NOT_ACCEPTABLE => {
                let mut multiple = Response::builder()
                    .status(StatusCode::MULTIPLE_CHOICES)
                    .header(VARY, "negotiate, accept")
                    .body(Vec::new())
                    .map_err(|e| NegotiationError::EncodeFailure(e.to_string()))?;
                multiple
                    .extensions_mut()
                    .insert(ReasonPhrase::new("Multiple Choices"));
                multiple
            }
            Err(error) => return Err(error),
        };

        if let Some(alternatives) = alternatives {
            if let Ok(header) = alternatives.parse() {
                response.headers_mut().insert("alternatives", header);
            }
            response
                .headers_mut()
                .insert("tcn", http::HeaderValue::from_static("list"));
        }
        Ok(response)
    }
}

/// Builds the protocol response for a recovered negotiation failure
///
/// Handlers call this at the request boundary: the error's status and reason
/// become the response status line and the body stays empty.
pub fn error_response(error: &NegotiationError) -> Response<Vec<u8>> {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = error.status();
    response
        .extensions_mut()
        .insert(ReasonPhrase::new(error.reason()));
    response
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
