use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use parley::content::{error_response, ContentNegotiator, Registry};
use parley::httpd::{Handler, Httpd, ServerConfig};
use parley::testing::{Request, Response, ServiceLayer};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// One parsed wire response
struct WireResponse {
    status: u16,
    reason: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Reads a single HTTP response off the stream using Content-Length framing
async fn read_wire_response(stream: &mut TcpStream) -> WireResponse {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before response headers finished");
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next().unwrap();
    let status: u16 = parts.next().unwrap().parse().unwrap();
    let reason = parts.next().unwrap_or("").to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(": ") {
            headers.insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse().unwrap())
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before response body finished");
        buffer.extend_from_slice(&chunk[..n]);
    }

    WireResponse {
        status,
        reason,
        headers,
        body: buffer[header_end..header_end + content_length].to_vec(),
    }
}

/// Connects, sends one raw request, and reads one response
async fn fetch(host: &str, raw_request: &str) -> WireResponse {
    let mut stream = TcpStream::connect(host).await.unwrap();
    stream.write_all(raw_request.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
    read_wire_response(&mut stream).await
}

#[tokio::test]
async fn programmed_responses_come_back_in_fifo_order() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("ordered").await.unwrap();
    service.add_response(Request::new(Method::GET, ["x"]), Response::new(StatusCode::OK));
    service.add_response(
        Request::new(Method::GET, ["x"]),
        Response::new(StatusCode::NOT_FOUND),
    );

    let request = "GET /x HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
    assert_eq!(fetch(service.host(), request).await.status, 200);
    assert_eq!(fetch(service.host(), request).await.status, 404);

    // The queue is drained; a third request is a test configuration error.
    let third = fetch(service.host(), request).await;
    assert_eq!(third.status, 456);
    assert_eq!(third.reason, "Test Configuration Error");
}

#[tokio::test]
async fn unknown_paths_are_answered_as_unexpected_requests() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("strict").await.unwrap();
    service.add_endpoint(["known"]);

    let response = fetch(
        service.host(),
        "GET /unknown HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(response.status, 456);
    assert_eq!(response.reason, "Unexpected Request");
}

#[tokio::test]
async fn programmed_body_headers_and_reason_reach_the_wire() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("wire").await.unwrap();
    service.add_response(
        Request::new(Method::GET, ["payload"]),
        Response::new(StatusCode::from_u16(222).unwrap())
            .with_header("x-marker", "yes")
            .with_body(b"hello".to_vec()),
    );

    let response = fetch(
        service.host(),
        "GET /payload HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(response.status, 222);
    assert_eq!(response.reason, "Unspecified");
    assert_eq!(response.headers["x-marker"], "yes");
    assert_eq!(response.body, b"hello");
}

#[tokio::test]
async fn recorded_requests_support_assertions() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("recorder").await.unwrap();
    service.add_response(
        Request::new(Method::POST, ["submit"]),
        Response::new(StatusCode::NO_CONTENT),
    );

    let body = r#"{"k":"v"}"#;
    let raw = format!(
        "POST /submit?foo=bar HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    assert_eq!(fetch(service.host(), &raw).await.status, 204);

    let recorded = service.get_request(["submit"]);
    assert_eq!(recorded.method(), &Method::POST);
    assert_eq!(recorded.body().unwrap().as_ref(), body.as_bytes());
    assert_eq!(recorded.query()["foo"], "bar");

    service.assert_request(&Method::POST, ["submit"], &[("foo", "bar")]);
}

#[tokio::test]
async fn each_service_listens_on_its_own_port() {
    let mut services = ServiceLayer::new();
    let billing = services.get_service("billing").await.unwrap();
    let shipping = services.get_service("shipping").await.unwrap();
    assert_ne!(billing.host(), shipping.host());

    billing.add_response(Request::new(Method::GET, ["a"]), Response::new(StatusCode::OK));
    shipping.add_response(
        Request::new(Method::GET, ["a"]),
        Response::new(StatusCode::IM_A_TEAPOT),
    );

    let request = "GET /a HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
    assert_eq!(fetch(billing.host(), request).await.status, 200);
    assert_eq!(fetch(shipping.host(), request).await.status, 418);
}

#[tokio::test]
async fn keep_alive_connections_serve_sequential_requests() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("pipelined").await.unwrap();
    service.add_response(Request::new(Method::GET, ["x"]), Response::new(StatusCode::OK));
    service.add_response(
        Request::new(Method::GET, ["x"]),
        Response::new(StatusCode::ACCEPTED),
    );

    let mut stream = TcpStream::connect(service.host()).await.unwrap();
    let request = "GET /x HTTP/1.1\r\nHost: localhost\r\n\r\n";

    stream.write_all(request.as_bytes()).await.unwrap();
    let first = read_wire_response(&mut stream).await;
    stream.write_all(request.as_bytes()).await.unwrap();
    let second = read_wire_response(&mut stream).await;

    assert_eq!(first.status, 200);
    assert_eq!(second.status, 202);
}

/// Handler that decodes the request body and echoes it back negotiated
struct EchoBody {
    registry: Arc<Registry>,
}

#[async_trait]
impl Handler for EchoBody {
    async fn handle(&self, request: http::Request<Bytes>) -> http::Response<Vec<u8>> {
        let mut negotiator = ContentNegotiator::from_request(&self.registry, &request);
        let body = match negotiator.request_body() {
            Ok(body) => body.clone(),
            Err(e) => return error_response(&e),
        };
        negotiator
            .send_response(&body)
            .unwrap_or_else(|e| error_response(&e))
    }
}

fn json_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_text_type(
            "application/json",
            "utf-8",
            Box::new(|value| Ok(serde_json::to_string(value)?)),
            Box::new(|text| Ok(serde_json::from_str(text)?)),
        )
        .unwrap();
    registry
}

async fn spawn_echo_server(registry: Registry) -> String {
    let handler = Arc::new(EchoBody {
        registry: Arc::new(registry),
    });
    let server = Httpd::bind(ServerConfig::default(), handler).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    format!("{}:{}", addr.ip(), addr.port())
}

#[tokio::test]
async fn latin1_request_is_reencoded_per_accept_charset() {
    let host = spawn_echo_server(json_registry()).await;

    // André with a latin1-encoded body, answered in utf-8.
    let body = b"{\"name\":\"Andr\xe9\"}";
    let mut raw = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\n\
         Content-Type: application/json; charset=latin1\r\n\
         Accept: application/json\r\nAccept-Charset: utf8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);

    let mut stream = TcpStream::connect(&host).await.unwrap();
    stream.write_all(&raw).await.unwrap();
    let response = read_wire_response(&mut stream).await;

    assert_eq!(response.status, 200);
    assert_eq!(
        response.headers["content-type"],
        "application/json; charset=utf8"
    );
    let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(value, json!({"name": "Andr\u{e9}"}));
}

#[tokio::test]
async fn undeclared_content_type_is_unsupported() {
    let host = spawn_echo_server(json_registry()).await;

    let response = fetch(
        &host,
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/xml\r\n\
         Content-Length: 6\r\nConnection: close\r\n\r\n<a></a",
    )
    .await;
    assert_eq!(response.status, 415);
    assert_eq!(response.reason, "Unexpected content type");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let host = spawn_echo_server(json_registry()).await;

    let response = fetch(
        &host,
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
         Content-Length: 8\r\nConnection: close\r\n\r\nnot json",
    )
    .await;
    assert_eq!(response.status, 400);
    assert_eq!(response.reason, "Content body decode failure");
}

#[tokio::test]
async fn accept_mismatch_is_not_acceptable() {
    let host = spawn_echo_server(json_registry()).await;

    let body = "{}";
    let raw = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
         Accept: application/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let response = fetch(&host, &raw).await;
    assert_eq!(response.status, 406);
}
