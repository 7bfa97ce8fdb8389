//! Test doubles for dependent HTTP services
//!
//! - [`ServiceLayer`]: test fixture that owns any number of simulated
//!   services and creates them on demand by name
//! - [`Service`]: one simulated HTTP service behind its own ephemeral port,
//!   holding programmed responses and recording every request it receives
//! - [`Request`]: describes a request the application under test makes;
//!   used both to program responses and as the recorded form
//! - [`Response`]: describes what a [`Service`] responds with
//!
//! Responses are consumed FIFO per `(method, path)` key, which models
//! sequential expectation-setting: the first matching request gets the
//! first programmed response, and a matching request with nothing left in
//! the queue is answered with status 456 `Test Configuration Error` so a
//! misconfigured test cannot be mistaken for an application error.
//!
//! # Examples
//!
//! ```no_run
//! use http::{Method, StatusCode};
//! use parley::testing::{Request, Response, ServiceLayer};
//!
//! # async fn example() -> parley::Result<()> {
//! let mut services = ServiceLayer::new();
//! let service = services.get_service("billing").await?;
//! service.add_response(
//!     Request::new(Method::GET, ["invoice", "42"]),
//!     Response::new(StatusCode::OK).with_body(b"{}".to_vec()),
//! );
//! let url = service.url_for(["invoice", "42"], &[]);
//! // ...point the application under test at `url` and let it fetch...
//! service.assert_request(&Method::GET, ["invoice", "42"], &[]);
//! # Ok(())
//! # }
//! ```

mod dispatch;

#[cfg(test)]
mod tests;

use crate::httpd::{Httpd, ServerConfig};
use crate::Result;
use bytes::Bytes;
use dispatch::{Dispatcher, ServiceState};
use http::{HeaderMap, Method, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use url::form_urlencoded;

/// Everything except unreserved characters and the path separator
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Joins path segments into a leading-slash resource path
///
/// Each segment is percent-encoded independently; a segment that already
/// contains `/` keeps it as a separator.
fn quote_path<I, S>(path: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = path
        .into_iter()
        .map(|segment| utf8_percent_encode(segment.as_ref(), PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

/// A request the application under test makes
///
/// [`Service::add_response`] uses the method and resource as the queue key;
/// the dispatcher records incoming traffic in this same shape, filling in
/// body, headers and query.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    resource: String,
    body: Option<Bytes>,
    headers: HeaderMap,
    query: HashMap<String, String>,
}

impl Request {
    /// Describes a `method` request for the resource at `path`
    pub fn new<I, S>(method: Method, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            method,
            resource: quote_path(path),
            body: None,
            headers: HeaderMap::new(),
            query: HashMap::new(),
        }
    }

    /// The HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The normalized resource path
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The recorded request body, if one was sent
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The recorded request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The recorded query parameters, one value per key
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Builds the recorded form of an inbound request
    ///
    /// Panics when the query string repeats a key: services simulated here
    /// contractually take at most one value per query parameter, so a
    /// duplicate is a bug in the test or the application under test.
    pub(crate) fn record(inbound: &http::Request<Bytes>) -> Self {
        let mut query = HashMap::new();
        if let Some(raw) = inbound.uri().query() {
            for (name, value) in form_urlencoded::parse(raw.as_bytes()) {
                let replaced = query.insert(name.to_string(), value.to_string());
                assert!(
                    replaced.is_none(),
                    "duplicate query parameter {name:?} in recorded request"
                );
            }
        }
        Self {
            method: inbound.method().clone(),
            resource: inbound.uri().path().to_string(),
            body: (!inbound.body().is_empty()).then(|| inbound.body().clone()),
            headers: inbound.headers().clone(),
            query,
        }
    }
}

/// A response a [`Service`] is programmed to return
///
/// Construction takes ownership of everything passed in, so later changes
/// to the caller's data cannot leak into an already-programmed response.
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use parley::testing::Response;
///
/// let response = Response::new(StatusCode::ACCEPTED)
///     .with_reason("Queued")
///     .with_header("x-job-id", "17")
///     .with_body(b"scheduled".to_vec());
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    reason: String,
    body: Option<Vec<u8>>,
    headers: Vec<(String, String)>,
}

impl Response {
    /// A response with the given status and the default reason phrase
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: "Unspecified".to_string(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// Sets the phrase returned on the status line
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    /// Sets the payload to return
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a response header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }

    pub(crate) fn reason(&self) -> &str {
        &self.reason
    }

    pub(crate) fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub(crate) fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// One simulated HTTP service on its own ephemeral port
///
/// Handles are cheap clones sharing the same state; the serving task is
/// aborted and the port released when the last handle is dropped. Create
/// services through [`ServiceLayer::get_service`] so they are tracked by
/// the fixture.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    name: String,
    host: String,
    state: Arc<Mutex<ServiceState>>,
    server_task: tokio::task::JoinHandle<()>,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

impl Service {
    async fn start(name: &str) -> Result<Self> {
        let state = Arc::new(Mutex::new(ServiceState::default()));
        let dispatcher = Arc::new(Dispatcher::new(name.to_string(), state.clone()));

        let server = Httpd::bind(ServerConfig::default(), dispatcher).await?;
        let addr = server.local_addr()?;
        let host = format!("{}:{}", addr.ip(), addr.port());
        info!(service = name, %addr, "mock service listening");

        let service_name = name.to_string();
        let server_task = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(service = %service_name, error = %e, "mock service stopped unexpectedly");
            }
        });

        Ok(Self {
            inner: Arc::new(ServiceInner {
                name: name.to_string(),
                host,
                state,
                server_task,
            }),
        })
    }

    /// The service name given to [`ServiceLayer::get_service`]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `host:port` the service listens on
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Registers an endpoint without programming a response
    ///
    /// Only needed for endpoints that should exist but stay unprogrammed;
    /// [`Service::add_response`] registers its endpoint automatically.
    pub fn add_endpoint<I, S>(&self, path: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resource = quote_path(path);
        self.register_endpoint(resource);
    }

    fn register_endpoint(&self, resource: String) {
        let mut state = self.inner.state.lock().unwrap();
        if state.endpoints.insert(resource.clone()) {
            info!(service = %self.inner.name, resource = %resource, "adding endpoint");
        }
    }

    /// Programs the service to answer `request` with `response`
    ///
    /// The endpoint is registered if necessary and `response` is appended
    /// to the FIFO queue for the request's `(method, resource)` key.
    pub fn add_response(&self, request: Request, response: Response) {
        self.register_endpoint(request.resource.clone());
        let mut state = self.inner.state.lock().unwrap();
        state
            .responses
            .entry((request.method, request.resource))
            .or_default()
            .push_back(response);
    }

    /// An absolute URL targeting this service
    ///
    /// Path segments are percent-encoded independently and query parameters
    /// are encoded and sorted by key, so repeated calls with the same
    /// arguments produce byte-identical URLs that tests can assert against.
    pub fn url_for<I, S>(&self, path: I, query: &[(&str, &str)]) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resource = quote_path(path);
        let mut pairs: Vec<_> = query.to_vec();
        pairs.sort();
        let query_str = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();

        if query_str.is_empty() {
            format!("http://{}{}", self.inner.host, resource)
        } else {
            format!("http://{}{}?{}", self.inner.host, resource, query_str)
        }
    }

    /// The requests recorded for `path`, in arrival order
    ///
    /// Panics when nothing was recorded for the path: this is a test
    /// assertion helper, and an absent request is a failed expectation, not
    /// an empty result.
    pub fn get_requests_for<I, S>(&self, path: I) -> Vec<Request>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.recorded_requests(&quote_path(path))
    }

    fn recorded_requests(&self, resource: &str) -> Vec<Request> {
        let state = self.inner.state.lock().unwrap();
        let requests = state.requests.get(resource).cloned().unwrap_or_default();
        assert!(!requests.is_empty(), "expected request for {resource}");
        requests
    }

    /// Convenience accessor for the first request recorded for `path`
    pub fn get_request<I, S>(&self, path: I) -> Request
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.get_requests_for(path).remove(0)
    }

    /// Asserts that a matching request was recorded
    ///
    /// A recorded request matches when its method equals `method` and its
    /// query parameters equal `query` exactly. Panics otherwise.
    pub fn assert_request<I, S>(&self, method: &Method, path: I, query: &[(&str, &str)])
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resource = quote_path(path);
        let expected: HashMap<String, String> = query
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        let requests = self.recorded_requests(&resource);
        let matched = requests
            .iter()
            .any(|request| request.method == *method && request.query == expected);
        assert!(
            matched,
            "expected {method} request for {resource} with query {expected:?}"
        );
    }
}

/// Test fixture owning any number of simulated HTTP services
///
/// Services are created lazily by name and live until the layer is dropped,
/// which aborts their serving tasks and releases their ports. A layer is
/// meant to live for the duration of one test fixture; never reuse services
/// across fixtures.
#[derive(Default)]
pub struct ServiceLayer {
    services: HashMap<String, Service>,
}

impl ServiceLayer {
    /// Creates an empty service layer
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a named service, creating and starting it if necessary
    pub async fn get_service(&mut self, name: &str) -> Result<Service> {
        if let Some(service) = self.services.get(name) {
            return Ok(service.clone());
        }
        let service = Service::start(name).await?;
        self.services.insert(name.to_string(), service.clone());
        Ok(service)
    }
}
