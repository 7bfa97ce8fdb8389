use crate::content::codec::{
    BinaryCodec, BinaryDump, BinaryLoad, CodecHandler, TextCodec, TextDump, TextLoad,
};
use crate::media::{MediaType, MediaTypeError};
use std::collections::HashMap;
use tracing::debug;

/// Registry of codec handlers keyed by content type
///
/// The registry is populated during application (or test) setup, then shared
/// immutably across request processing, typically behind an `Arc`. It is not
/// safe to mutate while requests are being served: registration must happen
/// before the first request, and [`Registry::clear`] belongs between test
/// cases.
///
/// Registration keys are the canonical type string with `q` and `charset`
/// stripped, so `application/json` and `application/json; charset=utf-8`
/// address the same handler. The order of first registration is preserved
/// and serves as the stable tie-break during encoding negotiation; callers
/// must not rely on it for anything else.
///
/// # Examples
///
/// ```
/// use parley::content::Registry;
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
/// assert_eq!(registry.registered_types().collect::<Vec<_>>(), ["application/json"]);
/// ```
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, CodecHandler>,
    types: Vec<MediaType>,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers handling for a text-based content type
    ///
    /// `default_encoding` is the charset used when a request carries no
    /// `charset` parameter and the response negotiation expresses no
    /// preference. Only the text half of an existing handler is replaced; a
    /// previously registered binary codec for the same type stays usable.
    pub fn register_text_type(
        &mut self,
        content_type: &str,
        default_encoding: &str,
        dump: TextDump,
        load: TextLoad,
    ) -> Result<(), MediaTypeError> {
        let handler = self.entry(content_type)?;
        handler.text = Some(TextCodec { dump, load });
        handler.default_encoding = Some(default_encoding.to_string());
        debug!(content_type, default_encoding, "registered text codec");
        Ok(())
    }

    /// Registers handling for a binary content type
    ///
    /// Only the binary half of an existing handler is replaced; a previously
    /// registered text codec for the same type stays usable (the binary path
    /// takes precedence when both are present).
    pub fn register_binary_type(
        &mut self,
        content_type: &str,
        dump: BinaryDump,
        load: BinaryLoad,
    ) -> Result<(), MediaTypeError> {
        let handler = self.entry(content_type)?;
        handler.binary = Some(BinaryCodec { dump, load });
        debug!(content_type, "registered binary codec");
        Ok(())
    }

    /// Removes every registered handler
    ///
    /// The registry is process-lifetime state when shared; tests that
    /// populate one must reset it between cases.
    pub fn clear(&mut self) {
        self.handlers.clear();
        self.types.clear();
    }

    /// Canonical type strings in registration order
    ///
    /// Each call yields a fresh iteration.
    pub fn registered_types(&self) -> impl Iterator<Item = String> + '_ {
        self.types.iter().map(MediaType::canonical)
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Looks up the handler registered for `media_type`, if any
    pub fn lookup(&self, media_type: &MediaType) -> Option<&CodecHandler> {
        self.handlers.get(&media_type.registration_key())
    }

    /// Parsed media types in registration order
    pub(crate) fn entries(&self) -> &[MediaType] {
        &self.types
    }

    fn entry(&mut self, content_type: &str) -> Result<&mut CodecHandler, MediaTypeError> {
        let parsed = MediaType::parse(content_type)?;
        let key = parsed.registration_key();
        if !self.handlers.contains_key(&key) {
            // Store the normalized form so candidates match the key.
            self.types.push(MediaType::parse(&key)?);
        }
        Ok(self.handlers.entry(key).or_default())
    }
}
