use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the HTTP serving layer
///
/// # Examples
///
/// ```
/// use parley::httpd::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig {
///     bind_addr: "127.0.0.1:8080".parse().unwrap(),
///     max_connections: 100,
///     buffer_size: 8192,
///     max_request_size: 1024 * 1024,
///     read_timeout: Duration::from_secs(30),
///     write_timeout: Duration::from_secs(30),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to; port 0 asks the OS for an ephemeral port
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Chunk size for socket reads
    pub buffer_size: usize,
    /// Upper bound on headers plus body for a single request
    pub max_request_size: usize,
    /// Read timeout per request
    pub read_timeout: Duration,
    /// Write timeout per response
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_connections: 100,
            buffer_size: 8192,
            max_request_size: 10 * 1024 * 1024,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}
