//! HTTP client adapter for the mess API.
//!
//! Every request goes through [`ApiClient::send`], which attaches the stored
//! session token as a bearer credential and turns a 401 into a session
//! expiry. The wire itself sits behind [`Transport`].

use crate::activity::ActivityLog;
use crate::envelope;
use crate::error::ApiError;
use crate::session::Session;
use serde_json::Value;
use std::error::Error as _;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3004";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// A fully prepared request, headers included.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and parsed body. Non-JSON bodies arrive as a JSON string,
/// empty bodies as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// Trait for the wire to allow mocking. Any HTTP status is `Ok`; only
/// failures to get a response at all are errors.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            timeout,
        }
    }

    fn classify(&self, err: ureq::Transport) -> ApiError {
        let io_failure = matches!(
            err.kind(),
            ureq::ErrorKind::Io | ureq::ErrorKind::ConnectionFailed
        );
        if io_failure && chain_timed_out(err.source()) {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut req = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.headers {
            req = req.set(name, value);
        }

        let result = match &request.body {
            Some(body) => req.send_json(body.clone()),
            None => req.call(),
        };

        let resp = match result {
            Ok(r) => r,
            Err(ureq::Error::Status(_, r)) => r,
            Err(ureq::Error::Transport(t)) => return Err(self.classify(t)),
        };

        let status = resp.status();
        let text = resp.into_string().map_err(|e| {
            if is_timeout(&e) {
                ApiError::Timeout(self.timeout)
            } else {
                ApiError::Network(e.to_string())
            }
        })?;
        Ok(HttpResponse::new(status, parse_body(&text)))
    }
}

/// Socket read deadlines surface as `WouldBlock` on some platforms.
fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn chain_timed_out(mut source: Option<&(dyn std::error::Error + 'static)>) -> bool {
    while let Some(err) = source {
        if err.downcast_ref::<io::Error>().is_some_and(is_timeout) {
            return true;
        }
        source = err.source();
    }
    false
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

pub struct ApiClient {
    base_url: String,
    transport: Box<dyn Transport>,
    session: Rc<Session>,
    log: Rc<ActivityLog>,
    debug: bool,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        transport: Box<dyn Transport>,
        session: Rc<Session>,
        log: Rc<ActivityLog>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            session,
            log,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    pub fn log(&self) -> &Rc<ActivityLog> {
        &self.log
    }

    /// Build the outgoing request for `path`, with a bearer token if one
    /// is stored and no authorization header otherwise.
    pub fn prepare(&self, method: Method, path: &str, body: Option<Value>) -> HttpRequest {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if let Some(token) = self.session.token() {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        HttpRequest {
            method,
            path: path.to_string(),
            url: format!("{}{}", self.base_url, path),
            headers,
            body,
        }
    }

    /// Send a request and return the parsed body of a 2xx response.
    ///
    /// A 401 clears the stored token and notifies session subscribers
    /// before the error is returned.
    pub fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let request = self.prepare(method, path, body);
        if self.debug {
            eprintln!(
                "[DEBUG] {} {} (auth: {})",
                method.as_str(),
                request.url,
                if request.header("Authorization").is_some() {
                    "bearer"
                } else {
                    "none"
                }
            );
        }

        let start = Instant::now();
        let response = match self.transport.send(&request) {
            Ok(r) => r,
            Err(e) => {
                let _ = self.log.request_failed(method.as_str(), path, &e.to_string());
                if self.debug {
                    eprintln!("[DEBUG] {} {} failed: {}", method.as_str(), path, e);
                }
                return Err(e);
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let _ = self
            .log
            .request(method.as_str(), path, response.status, duration_ms);
        if self.debug {
            eprintln!(
                "[DEBUG] {} {} -> {} ({}ms)",
                method.as_str(),
                path,
                response.status,
                duration_ms
            );
        }

        match response.status {
            401 => {
                self.session.expire();
                Err(ApiError::Unauthorized {
                    message: envelope::error_message(&response.body),
                })
            }
            200..=299 => Ok(response.body),
            status => Err(ApiError::Status {
                status,
                message: envelope::error_message(&response.body),
            }),
        }
    }

    pub fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::Get, path, None)
    }

    pub fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(Method::Post, path, Some(body))
    }

    pub fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(Method::Put, path, Some(body))
    }

    pub fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::Delete, path, None)
    }
}

/// Recording transport shared by the tests of every layer above the adapter.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays queued replies in order and records every request. An empty
    /// queue answers `200 []`.
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        calls: Rc<RefCell<Vec<HttpRequest>>>,
        replies: Rc<RefCell<VecDeque<Result<HttpResponse, ApiError>>>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(&self, status: u16, body: Value) -> &Self {
            self.replies
                .borrow_mut()
                .push_back(Ok(HttpResponse::new(status, body)));
            self
        }

        pub fn fail(&self, err: ApiError) -> &Self {
            self.replies.borrow_mut().push_back(Err(err));
            self
        }

        pub fn calls(&self) -> Vec<HttpRequest> {
            self.calls.borrow().clone()
        }

        /// Calls as `"METHOD /path"`, in dispatch order.
        pub fn trace(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(|r| format!("{} {}", r.method.as_str(), r.path))
                .collect()
        }

        pub fn count(&self, method: Method, path: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|r| r.method == method && r.path == path)
                .count()
        }

        pub fn count_method(&self, method: Method) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|r| r.method == method)
                .count()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.calls.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(200, Value::Array(Vec::new()))))
        }
    }

    /// Client over a fresh in-memory session.
    pub fn client(transport: &RecordingTransport) -> ApiClient {
        let session = Rc::new(Session::in_memory());
        ApiClient::new(
            "http://api.test",
            Box::new(transport.clone()),
            session,
            Rc::new(ActivityLog::disabled()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{client, RecordingTransport};
    use super::*;
    use std::error::Error;
    use crate::session::SessionEvent;
    use serde_json::json;

    #[test]
    fn test_bearer_attached_when_token_stored() {
        let transport = RecordingTransport::new();
        let api = client(&transport);
        api.session().store("t1").unwrap();

        api.get("/messes").unwrap();
        api.post("/messes", json!({"name": "A"})).unwrap();

        for call in transport.calls() {
            assert_eq!(call.header("authorization"), Some("Bearer t1"));
        }
    }

    #[test]
    fn test_no_authorization_header_without_token() {
        let transport = RecordingTransport::new();
        let api = client(&transport);

        api.post("/auth/login", json!({"email": "a@b.c"})).unwrap();
        api.get("/messes").unwrap();

        for call in transport.calls() {
            assert!(call.header("Authorization").is_none());
            assert_eq!(call.header("Content-Type"), Some("application/json"));
        }
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let transport = RecordingTransport::new();
        let session = Rc::new(Session::in_memory());
        let api = ApiClient::new(
            "http://localhost:3004/",
            Box::new(transport.clone()),
            session,
            Rc::new(ActivityLog::disabled()),
        );
        api.delete("/messes/m1").unwrap();
        assert_eq!(transport.calls()[0].url, "http://localhost:3004/messes/m1");
    }

    #[test]
    fn test_401_clears_token_and_emits_expired() {
        for method in [Method::Get, Method::Post, Method::Put, Method::Delete] {
            let transport = RecordingTransport::new();
            let api = client(&transport);
            api.session().store("stale").unwrap();
            let rx = api.session().subscribe();
            transport.reply(401, json!({"message": "jwt expired"}));

            let body = if method == Method::Get || method == Method::Delete {
                None
            } else {
                Some(json!({}))
            };
            let err = api.send(method, "/messes", body).unwrap_err();

            assert!(err.is_unauthorized());
            assert_eq!(err.server_message(), Some("jwt expired"));
            assert!(!api.session().is_authenticated());
            assert_eq!(rx.try_recv(), Ok(SessionEvent::Expired));
        }
    }

    #[test]
    fn test_other_statuses_propagate_without_touching_session() {
        let transport = RecordingTransport::new();
        let api = client(&transport);
        api.session().store("t1").unwrap();
        transport
            .reply(404, json!({"message": "Mess not found"}))
            .reply(500, Value::Null)
            .reply(403, json!({"message": "Forbidden"}));

        let err = api.get("/messes/x").unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                status: 404,
                message: Some("Mess not found".to_string())
            }
        );
        let err = api.get("/messes").unwrap_err();
        assert_eq!(err.server_message(), None);
        let err = api.delete("/messes/x").unwrap_err();
        assert!(!err.is_unauthorized());

        assert!(api.session().is_authenticated());
    }

    #[test]
    fn test_transport_errors_propagate_unchanged() {
        let transport = RecordingTransport::new();
        let api = client(&transport);
        api.session().store("t1").unwrap();
        transport
            .fail(ApiError::Timeout(Duration::from_secs(10)))
            .fail(ApiError::Network("connection refused".to_string()));

        assert_eq!(
            api.get("/messes").unwrap_err(),
            ApiError::Timeout(Duration::from_secs(10))
        );
        assert!(matches!(api.get("/messes").unwrap_err(), ApiError::Network(_)));
        assert!(api.session().is_authenticated());
    }

    #[test]
    fn test_success_returns_body() {
        let transport = RecordingTransport::new();
        let api = client(&transport);
        transport.reply(201, json!({"id": "m9"}));
        assert_eq!(api.post("/messes", json!({})).unwrap(), json!({"id": "m9"}));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body("Not Found"), json!("Not Found"));
    }

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "wrapped")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_timeout_found_by_error_kind() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_timeout(&io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "timeout in the message is not a timeout"
        )));

        let nested = Wrapped(io::Error::from(io::ErrorKind::TimedOut));
        assert!(chain_timed_out(nested.source()));
        let refused = Wrapped(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(!chain_timed_out(refused.source()));
        assert!(!chain_timed_out(None));
    }

    fn get_request(url: String) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            path: "/messes".to_string(),
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn test_silent_server_times_out() {
        // Connections queue in the backlog and never get an answer
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/messes", listener.local_addr().unwrap());

        let transport = UreqTransport::new(Duration::from_millis(200));
        assert_eq!(
            transport.send(&get_request(url)).unwrap_err(),
            ApiError::Timeout(Duration::from_millis(200))
        );
        drop(listener);
    }

    #[test]
    fn test_refused_connection_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = UreqTransport::new(Duration::from_secs(2));
        let err = transport
            .send(&get_request(format!("http://{}/messes", addr)))
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
