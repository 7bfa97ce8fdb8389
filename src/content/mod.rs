//! Content negotiation
//!
//! This module selects wire representations for request and response bodies
//! based on `Content-Type`, `Accept` and `Accept-Charset` headers and a
//! [`Registry`] of codecs.
//!
//! The pieces compose bottom-up: a [`CodecHandler`] wraps the dump/load
//! closures for one content type, the [`Registry`] maps canonical content
//! type strings to handlers, the functions in [`negotiate`] pick handlers for
//! a concrete request, and [`ContentNegotiator`] ties all of it to a single
//! request's headers and body.

pub mod codec;
pub mod negotiate;
pub mod negotiator;
pub mod registry;


pub use codec::{BinaryDump, BinaryLoad, CodecHandler, TextDump, TextLoad};
pub use negotiate::{
    decode_body, encode_body, select_for_decoding, select_for_encoding, NegotiationError,
};
pub use negotiator::{error_response, ContentNegotiator};
pub use registry::Registry;
