use super::dispatch::{Dispatcher, ServiceState};
use super::{quote_path, Request, Response, ServiceLayer};
use crate::httpd::{Handler, ReasonPhrase};
use bytes::Bytes;
use http::{Method, StatusCode};
use std::sync::{Arc, Mutex};

fn inbound(method: &str, target: &str) -> http::Request<Bytes> {
    http::Request::builder()
        .method(method)
        .uri(target)
        .body(Bytes::new())
        .unwrap()
}

fn reason(response: &http::Response<Vec<u8>>) -> &str {
    response
        .extensions()
        .get::<ReasonPhrase>()
        .map(ReasonPhrase::as_str)
        .unwrap_or("")
}

fn dispatcher() -> (Dispatcher, Arc<Mutex<ServiceState>>) {
    let state = Arc::new(Mutex::new(ServiceState::default()));
    (Dispatcher::new("svc".to_string(), state.clone()), state)
}

#[test]
fn quote_path_joins_and_encodes_segments() {
    assert_eq!(quote_path(["x"]), "/x");
    assert_eq!(quote_path(["/x"]), "/x");
    assert_eq!(
        quote_path(["path that", "needs", "quo+ing"]),
        "/path%20that/needs/quo%2Bing"
    );
}

#[test]
fn programmed_request_normalizes_resource() {
    let request = Request::new(Method::GET, ["a b", "c"]);
    assert_eq!(request.resource(), "/a%20b/c");
    assert_eq!(request.method(), &Method::GET);
    assert!(request.body().is_none());
    assert!(request.query().is_empty());
}

#[test]
fn response_defaults() {
    let response = Response::new(StatusCode::OK);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.reason(), "Unspecified");
    assert!(response.body_bytes().is_none());
    assert!(response.headers().is_empty());
}

#[test]
fn response_builder_accumulates() {
    let response = Response::new(StatusCode::ACCEPTED)
        .with_reason("Queued")
        .with_header("x-job-id", "17")
        .with_body(b"scheduled".to_vec());
    assert_eq!(response.reason(), "Queued");
    assert_eq!(response.body_bytes(), Some(&b"scheduled"[..]));
    assert_eq!(
        response.headers(),
        &[("x-job-id".to_string(), "17".to_string())][..]
    );
}

#[tokio::test]
async fn responses_are_consumed_in_fifo_order() {
    let (dispatcher, state) = dispatcher();
    {
        let mut state = state.lock().unwrap();
        state.endpoints.insert("/x".to_string());
        let queue = state
            .responses
            .entry((Method::GET, "/x".to_string()))
            .or_default();
        queue.push_back(Response::new(StatusCode::OK));
        queue.push_back(Response::new(StatusCode::NOT_FOUND));
    }

    let first = dispatcher.handle(inbound("GET", "/x")).await;
    let second = dispatcher.handle(inbound("GET", "/x")).await;
    let third = dispatcher.handle(inbound("GET", "/x")).await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    assert_eq!(third.status().as_u16(), 456);
    assert_eq!(reason(&third), "Test Configuration Error");
}

#[tokio::test]
async fn queues_are_keyed_by_method_and_path() {
    let (dispatcher, state) = dispatcher();
    {
        let mut state = state.lock().unwrap();
        state.endpoints.insert("/x".to_string());
        state
            .responses
            .entry((Method::POST, "/x".to_string()))
            .or_default()
            .push_back(Response::new(StatusCode::CREATED));
    }

    // A GET must not consume the POST queue.
    let get = dispatcher.handle(inbound("GET", "/x")).await;
    assert_eq!(get.status().as_u16(), 456);

    let post = dispatcher.handle(inbound("POST", "/x")).await;
    assert_eq!(post.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unregistered_paths_hit_the_default_handler() {
    let (dispatcher, state) = dispatcher();
    let response = dispatcher.handle(inbound("GET", "/nowhere")).await;
    assert_eq!(response.status().as_u16(), 456);
    assert_eq!(reason(&response), "Unexpected Request");
    assert!(state.lock().unwrap().requests.is_empty());
}

#[tokio::test]
async fn requests_are_recorded_even_without_a_programmed_response() {
    let (dispatcher, state) = dispatcher();
    state.lock().unwrap().endpoints.insert("/r".to_string());

    let request = http::Request::builder()
        .method("POST")
        .uri("/r?foo=bar")
        .header("x-test", "1")
        .body(Bytes::from_static(b"payload"))
        .unwrap();
    let response = dispatcher.handle(request).await;
    assert_eq!(response.status().as_u16(), 456);

    let state = state.lock().unwrap();
    let recorded = &state.requests["/r"];
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method(), &Method::POST);
    assert_eq!(recorded[0].query()["foo"], "bar");
    assert_eq!(recorded[0].body().unwrap().as_ref(), b"payload");
    assert_eq!(recorded[0].headers()["x-test"], "1");
}

#[tokio::test]
async fn programmed_headers_and_body_reach_the_wire_response() {
    let (dispatcher, state) = dispatcher();
    {
        let mut state = state.lock().unwrap();
        state.endpoints.insert("/r".to_string());
        state
            .responses
            .entry((Method::GET, "/r".to_string()))
            .or_default()
            .push_back(
                Response::new(StatusCode::OK)
                    .with_header("x-marker", "yes")
                    .with_body(b"hello".to_vec()),
            );
    }

    let response = dispatcher.handle(inbound("GET", "/r")).await;
    assert_eq!(response.headers()["x-marker"], "yes");
    assert_eq!(response.body(), &b"hello".to_vec());
}

#[tokio::test]
async fn url_for_is_deterministic_and_encoded() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("endpoint").await.unwrap();

    let url = service.url_for(["a b"], &[("c", "1 2")]);
    assert!(url.starts_with("http://127.0.0.1:"));
    assert!(url.ends_with("/a%20b?c=1+2"));
    assert_eq!(url, service.url_for(["a b"], &[("c", "1 2")]));
}

#[tokio::test]
async fn url_for_sorts_query_parameters() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("endpoint").await.unwrap();

    let url = service.url_for(
        ["r"],
        &[("third", "3"), ("first", "1"), ("second", "2"), ("fini", "first")],
    );
    let query = url.split_once('?').unwrap().1;
    assert_eq!(query, "fini=first&first=1&second=2&third=3");
}

#[tokio::test]
async fn services_are_created_once_per_name() {
    let mut services = ServiceLayer::new();
    let first = services.get_service("one").await.unwrap();
    let again = services.get_service("one").await.unwrap();
    let other = services.get_service("two").await.unwrap();

    assert_eq!(first.host(), again.host());
    assert_ne!(first.host(), other.host());
}

#[tokio::test]
#[should_panic(expected = "expected request for /missing")]
async fn get_requests_for_panics_without_recorded_requests() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("svc").await.unwrap();
    service.add_endpoint(["missing"]);
    let _ = service.get_requests_for(["missing"]);
}

#[tokio::test]
async fn assert_request_matches_method_and_query() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("svc").await.unwrap();
    service.add_endpoint(["r"]);
    {
        let mut state = service.inner.state.lock().unwrap();
        let recorded = Request::record(
            &http::Request::builder()
                .method("GET")
                .uri("/r?foo=bar")
                .body(Bytes::new())
                .unwrap(),
        );
        state.requests.entry("/r".to_string()).or_default().push(recorded);
    }

    service.assert_request(&Method::GET, ["r"], &[("foo", "bar")]);
}

#[tokio::test]
#[should_panic(expected = "expected GET request for /r")]
async fn assert_request_rejects_query_mismatch() {
    let mut services = ServiceLayer::new();
    let service = services.get_service("svc").await.unwrap();
    service.add_endpoint(["r"]);
    {
        let mut state = service.inner.state.lock().unwrap();
        let recorded = Request::record(
            &http::Request::builder()
                .method("GET")
                .uri("/r?foo=baz")
                .body(Bytes::new())
                .unwrap(),
        );
        state.requests.entry("/r".to_string()).or_default().push(recorded);
    }

    service.assert_request(&Method::GET, ["r"], &[("foo", "bar")]);
}

#[test]
#[should_panic(expected = "duplicate query parameter")]
fn duplicate_query_keys_are_a_caller_error() {
    let request = http::Request::builder()
        .method("GET")
        .uri("/r?foo=1&foo=2")
        .body(Bytes::new())
        .unwrap();
    let _ = Request::record(&request);
}
