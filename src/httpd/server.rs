use crate::httpd::connection::{keep_alive, read_request, write_response};
use crate::httpd::ServerConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{error, info, warn, Instrument};

/// Produces a response for each parsed request
///
/// Implementations must be cheap to share: the server holds one `Arc<H>`
/// and clones it into every connection task.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request<Bytes>) -> Response<Vec<u8>>;
}

/// Generic HTTP server: accept loop plus task-per-connection dispatch
///
/// Binding is eager so the ephemeral port is known before [`Httpd::run`] is
/// called; the mock service layer depends on that to hand out URLs before
/// any request is made.
pub struct Httpd<H: Handler> {
    listener: TcpListener,
    config: ServerConfig,
    handler: Arc<H>,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl<H: Handler> Httpd<H> {
    /// Binds the listener and prepares the server
    pub async fn bind(config: ServerConfig, handler: Arc<H>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Ok(Self {
            listener,
            config,
            handler,
            shutdown_signal: Arc::new(shutdown_signal),
        })
    }

    /// The address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::Io)
    }

    /// Returns a sender that can be used to gracefully shut the server down
    pub fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }

    /// Accepts connections until shut down
    pub async fn run(&self) -> Result<()> {
        info!(address = %self.local_addr()?, "HTTP server listening");

        let connection_count = Arc::new(AtomicUsize::new(0));
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let current_count = connection_count.load(Ordering::SeqCst);
                            if current_count >= self.config.max_connections {
                                warn!(%addr, current = current_count, limit = self.config.max_connections, "Connection rejected: limit reached");
                                continue;
                            }

                            connection_count.fetch_add(1, Ordering::SeqCst);
                            let new_count = connection_count.load(Ordering::SeqCst);
                            info!(%addr, current = new_count, "Accepted connection");

                            let config = self.config.clone();
                            let handler = self.handler.clone();
                            let connection_count = connection_count.clone();
                            let span = tracing::info_span!("connection", %addr);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, config, handler).instrument(span).await {
                                    error!(%addr, error = %e, "Error handling connection");
                                }
                                connection_count.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Serves one connection until it closes or an error ends it
async fn handle_connection<H: Handler>(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: ServerConfig,
    handler: Arc<H>,
) -> Result<()> {
    loop {
        let read_result = timeout(
            config.read_timeout,
            read_request(&mut stream, config.buffer_size, config.max_request_size),
        )
        .await;
        let request = match read_result {
            Ok(Ok(Some(request))) => request,
            Ok(Ok(None)) => {
                info!(%addr, "Client closed connection");
                break;
            }
            Ok(Err(e)) => {
                return Err(e.into());
            }
            Err(_) => {
                warn!(%addr, "Read timeout");
                break;
            }
        };

        let again = keep_alive(&request);
        info!(%addr, method = %request.method(), path = %request.uri(), "Received request");

        let response = handler.handle(request).await;
        let write_result = timeout(
            config.write_timeout,
            write_response(&mut stream, &response),
        )
        .await;
        match write_result {
            Ok(Ok(())) => {
                info!(%addr, status = %response.status(), "Sent response");
            }
            Ok(Err(e)) => {
                return Err(e.into());
            }
            Err(_) => {
                warn!(%addr, "Write timeout");
                break;
            }
        }

        if !again {
            break;
        }
    }

    Ok(())
}
