use crate::content::negotiate::NegotiationError;
use encoding_rs::Encoding;
use serde_json::Value;
use tracing::warn;

/// Boxed error type codec closures may return
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Serializes a value to text, e.g. `serde_json::to_string`
pub type TextDump = Box<dyn Fn(&Value) -> Result<String, CodecError> + Send + Sync>;
/// Deserializes a value from text, e.g. `serde_json::from_str`
pub type TextLoad = Box<dyn Fn(&str) -> Result<Value, CodecError> + Send + Sync>;
/// Serializes a value to bytes, e.g. `rmp_serde::to_vec`
pub type BinaryDump = Box<dyn Fn(&Value) -> Result<Vec<u8>, CodecError> + Send + Sync>;
/// Deserializes a value from bytes, e.g. `rmp_serde::from_slice`
pub type BinaryLoad = Box<dyn Fn(&[u8]) -> Result<Value, CodecError> + Send + Sync>;

pub(crate) struct TextCodec {
    pub dump: TextDump,
    pub load: TextLoad,
}

pub(crate) struct BinaryCodec {
    pub dump: BinaryDump,
    pub load: BinaryLoad,
}

/// Encode/decode hooks for one registered content type
///
/// A handler carries up to two codecs: a text codec, which works through an
/// intermediate string and therefore needs a charset, and a binary codec,
/// which works on raw bytes and ignores charsets entirely. Registering the
/// text half and the binary half separately fills each half independently;
/// neither registration clears the other.
///
/// When both halves are present the binary codec wins. Binary loaders must
/// produce [`Value`]s whose string leaves are UTF-8 text; payloads carrying
/// raw byte strings are not representable and fail decoding.
#[derive(Default)]
pub struct CodecHandler {
    pub(crate) text: Option<TextCodec>,
    pub(crate) binary: Option<BinaryCodec>,
    pub(crate) default_encoding: Option<String>,
}

impl std::fmt::Debug for CodecHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The codec closures are not `Debug`; report which halves are present.
        f.debug_struct("CodecHandler")
            .field("text", &self.text.is_some())
            .field("binary", &self.binary.is_some())
            .field("default_encoding", &self.default_encoding)
            .finish()
    }
}

impl CodecHandler {
    /// Whether a text codec is registered
    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    /// Whether a binary codec is registered
    pub fn has_binary(&self) -> bool {
        self.binary.is_some()
    }

    /// Decodes a request body
    ///
    /// `charset` is the label taken from the request's `Content-Type`
    /// header (or an explicit override); the handler's default encoding and
    /// finally utf-8 are used when absent. Binary codecs ignore `charset`.
    pub fn unpack_bytes(&self, body: &[u8], charset: Option<&str>) -> Result<Value, NegotiationError> {
        if let Some(binary) = &self.binary {
            return (binary.load)(body)
                .map_err(|e| NegotiationError::DecodeFailure(e.to_string()));
        }

        let text = self.text.as_ref().ok_or_else(|| {
            NegotiationError::DecodeFailure("no decoder registered".to_string())
        })?;

        let label = charset
            .or(self.default_encoding.as_deref())
            .unwrap_or("utf-8");
        let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
            NegotiationError::DecodeFailure(format!("unknown charset {label:?}"))
        })?;
        let (decoded, _, had_errors) = encoding.decode(body);
        if had_errors {
            return Err(NegotiationError::DecodeFailure(format!(
                "body is not valid {label}"
            )));
        }

        (text.load)(&decoded).map_err(|e| NegotiationError::DecodeFailure(e.to_string()))
    }

    /// Encodes a response body
    ///
    /// Returns the charset label actually used alongside the bytes. Binary
    /// codecs return no label and the response `Content-Type` must omit the
    /// `charset` parameter. For text codecs, characters unrepresentable in
    /// the chosen charset force a fallback to utf-8 rather than losing data.
    pub fn pack_bytes(
        &self,
        value: &Value,
        charset: Option<&str>,
    ) -> Result<(Option<String>, Vec<u8>), NegotiationError> {
        if let Some(binary) = &self.binary {
            let bytes = (binary.dump)(value)
                .map_err(|e| NegotiationError::EncodeFailure(e.to_string()))?;
            return Ok((None, bytes));
        }

        let text = self.text.as_ref().ok_or_else(|| {
            NegotiationError::EncodeFailure("no encoder registered".to_string())
        })?;

        let label = charset
            .or(self.default_encoding.as_deref())
            .unwrap_or("utf-8")
            .to_ascii_lowercase();
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| NegotiationError::UnsupportedCharset(label.clone()))?;

        let rendered = (text.dump)(value)
            .map_err(|e| NegotiationError::EncodeFailure(e.to_string()))?;
        let (bytes, _, had_unmappable) = encoding.encode(&rendered);
        if had_unmappable {
            warn!(charset = %label, "response not representable in negotiated charset, falling back to utf-8");
            return Ok((Some("utf-8".to_string()), rendered.into_bytes()));
        }
        Ok((Some(label), bytes.into_owned()))
    }
}
