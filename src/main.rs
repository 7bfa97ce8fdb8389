use async_trait::async_trait;
use bytes::Bytes;
use color_eyre::eyre::{Result, WrapErr};
use http::{Method, Request, Response, StatusCode};
use parley::content::{error_response, ContentNegotiator, Registry};
use parley::httpd::{Handler, Httpd, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Demo application: an httpbin-style echo endpoint plus a transparent
/// negotiation endpoint, both speaking every registered content type.
struct DemoHandler {
    registry: Arc<Registry>,
}

impl DemoHandler {
    /// Mimics http://httpbin.org/{get,post}
    fn echo(&self, request: &Request<Bytes>, body: Option<Value>) -> Response<Vec<u8>> {
        let args: serde_json::Map<String, Value> = request
            .uri()
            .query()
            .map(|raw| {
                url::form_urlencoded::parse(raw.as_bytes())
                    .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let headers: serde_json::Map<String, Value> = request
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), Value::String(v.to_string())))
            })
            .collect();

        let mut reply = json!({
            "args": args,
            "headers": headers,
            "url": request.uri().to_string(),
        });
        if let Some(body) = body {
            reply["body"] = body;
        }

        let negotiator = ContentNegotiator::from_request(&self.registry, request);
        negotiator
            .send_response(&reply)
            .unwrap_or_else(|e| error_response(&e))
    }

    /// Implements a bare-bones version of RFC 2295 negotiation
    fn negotiate(&self, request: &Request<Bytes>) -> Response<Vec<u8>> {
        let negotiator = ContentNegotiator::from_request(&self.registry, request);
        negotiator
            .send_negotiated_response(&json!({"hi": "there"}), request.uri().path())
            .unwrap_or_else(|e| error_response(&e))
    }
}

#[async_trait]
impl Handler for DemoHandler {
    async fn handle(&self, request: Request<Bytes>) -> Response<Vec<u8>> {
        match (request.method(), request.uri().path()) {
            (&Method::GET, "/") => self.echo(&request, None),
            (&Method::POST, "/") => {
                let mut negotiator = ContentNegotiator::from_request(&self.registry, &request);
                match negotiator.request_body() {
                    Ok(body) => {
                        let body = body.clone();
                        self.echo(&request, Some(body))
                    }
                    Err(e) => error_response(&e),
                }
            }
            (&Method::GET, "/negotiate") => self.negotiate(&request),
            _ => {
                let mut response = Response::new(Vec::new());
                *response.status_mut() = StatusCode::NOT_FOUND;
                response
            }
        }
    }
}

fn build_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    registry
        .register_text_type(
            "application/json",
            "utf-8",
            Box::new(|value| Ok(serde_json::to_string(value)?)),
            Box::new(|text| Ok(serde_json::from_str(text)?)),
        )
        .wrap_err("Failed to register JSON codec")?;
    registry
        .register_binary_type(
            "application/msgpack",
            Box::new(|value| Ok(rmp_serde::to_vec(value)?)),
            Box::new(|bytes| Ok(rmp_serde::from_slice(bytes)?)),
        )
        .wrap_err("Failed to register MessagePack codec")?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("parley=info")
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = args
        .get(1)
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8000);

    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{}", port)
            .parse()
            .wrap_err("Invalid bind address")?,
        max_connections: 1000,
        buffer_size: 8192,
        max_request_size: 10 * 1024 * 1024,
        read_timeout: Duration::from_secs(30),
        write_timeout: Duration::from_secs(30),
    };

    let handler = Arc::new(DemoHandler {
        registry: Arc::new(build_registry()?),
    });
    let server = Httpd::bind(config, handler)
        .await
        .wrap_err("Failed to bind demo server")?;
    info!(address = %server.local_addr()?, "Starting content negotiation demo server");

    let shutdown = server.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(());
        }
    });

    server.run().await.wrap_err("Failed to run demo server")?;
    Ok(())
}
