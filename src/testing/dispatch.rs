use crate::httpd::{Handler, ReasonPhrase};
use crate::testing::{Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Status answered for requests the test did not program
///
/// 456 is unassigned, which keeps it impossible to confuse with any status
/// an application under test could legitimately receive from a programmed
/// response.
const TEST_CONFIGURATION_ERROR: u16 = 456;

/// Shared mutable state of one mock service
///
/// Response queues are an explicit ordered multi-map: one FIFO of
/// programmed responses per `(method, resource)` key. The request log is
/// append-only per resource.
#[derive(Default)]
pub(crate) struct ServiceState {
    pub endpoints: HashSet<String>,
    pub responses: HashMap<(Method, String), VecDeque<Response>>,
    pub requests: HashMap<String, Vec<Request>>,
}

impl ServiceState {
    fn next_response(&mut self, method: &Method, resource: &str) -> Option<Response> {
        self.responses
            .get_mut(&(method.clone(), resource.to_string()))
            .and_then(VecDeque::pop_front)
    }
}

/// Turns inbound test traffic into recorded requests and popped responses
pub(crate) struct Dispatcher {
    service_name: String,
    state: Arc<Mutex<ServiceState>>,
}

impl Dispatcher {
    pub fn new(service_name: String, state: Arc<Mutex<ServiceState>>) -> Self {
        Self {
            service_name,
            state,
        }
    }

    fn unexpected(&self, reason: &'static str) -> http::Response<Vec<u8>> {
        let mut response = http::Response::new(Vec::new());
        *response.status_mut() =
            StatusCode::from_u16(TEST_CONFIGURATION_ERROR).unwrap_or(StatusCode::BAD_REQUEST);
        response.extensions_mut().insert(ReasonPhrase::new(reason));
        response
    }
}

#[async_trait]
impl Handler for Dispatcher {
    async fn handle(&self, inbound: http::Request<Bytes>) -> http::Response<Vec<u8>> {
        let method = inbound.method().clone();
        let resource = inbound.uri().path().to_string();
        debug!(service = %self.service_name, %method, resource = %resource, "processing request");

        let mut state = self.state.lock().unwrap();
        if !state.endpoints.contains(&resource) {
            error!(
                service = %self.service_name,
                resource = %resource,
                "request for unregistered endpoint"
            );
            return self.unexpected("Unexpected Request");
        }

        // Record before looking for a response: an unprogrammed request
        // still counts as received.
        let recorded = Request::record(&inbound);
        state
            .requests
            .entry(resource.clone())
            .or_default()
            .push(recorded);

        let Some(programmed) = state.next_response(&method, &resource) else {
            error!(
                service = %self.service_name,
                %method,
                resource = %resource,
                "no response programmed for request"
            );
            return self.unexpected("Test Configuration Error");
        };
        drop(state);

        debug!(
            service = %self.service_name,
            %method,
            resource = %resource,
            status = %programmed.status(),
            "returning programmed response"
        );
        render(&programmed)
    }
}

/// Builds the wire response for a programmed [`Response`]
fn render(programmed: &Response) -> http::Response<Vec<u8>> {
    let body = programmed.body_bytes().map(<[u8]>::to_vec).unwrap_or_default();
    let mut response = http::Response::new(body);
    *response.status_mut() = programmed.status();
    response
        .extensions_mut()
        .insert(ReasonPhrase::new(programmed.reason()));

    for (name, value) in programmed.headers() {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .ok()
            .zip(HeaderValue::from_str(value).ok());
        match parsed {
            Some((name, value)) => {
                response.headers_mut().append(name, value);
            }
            None => warn!(header = %name, "skipping malformed programmed header"),
        }
    }
    response
}
