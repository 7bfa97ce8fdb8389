//! Minimal HTTP/1.1 serving layer
//!
//! This module provides just enough HTTP to host the mock services in
//! [`crate::testing`] and the demo binary: an incremental request reader
//! built on `httparse`, a response writer that honors custom reason
//! phrases, and a generic accept loop with connection limits and graceful
//! shutdown. It is not a general HTTP server: no TLS, no HTTP/2, no chunked
//! transfer encoding.

pub mod config;
pub mod connection;
pub mod server;

pub use config::ServerConfig;
pub use connection::{read_request, write_response, HttpdError, ReasonPhrase};
pub use server::{Handler, Httpd};
