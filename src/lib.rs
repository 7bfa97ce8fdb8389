use crate::content::NegotiationError;
use crate::httpd::HttpdError;
use crate::media::MediaTypeError;
use thiserror::Error;

/// Error types for the parley library
#[derive(Error, Debug)]
pub enum Error {
    /// Socket-level errors (bind, accept, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-level HTTP errors from the serving layer
    #[error("HTTP error: {0}")]
    Httpd(#[from] HttpdError),

    /// Content negotiation and codec errors
    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Invalid media type strings handed to the registry
    #[error("media type error: {0}")]
    MediaType(#[from] MediaTypeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for the parley library
pub type Result<T> = std::result::Result<T, Error>;

pub mod content;
pub mod httpd;
pub mod media;
pub mod testing;

// Re-export main types for convenience
pub use content::{CodecHandler, ContentNegotiator, Registry};
pub use httpd::{Handler, Httpd, ServerConfig};
pub use media::{AcceptCharset, AcceptHeader, MediaType};
pub use testing::{Request, Response, Service, ServiceLayer};
