//! Request and response values exchanged with the transport

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use session_auth::BEARER_SCHEME;
use tracing::warn;

/// One-shot retry flags carried by a request through the interceptor.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Attempt {
    /// Already replayed after a token refresh; a further 401 is final
    pub refreshed: bool,
    /// Already resent once with the stored token
    pub stale_retried: bool,
}

/// Outgoing API request. `path` is relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub(crate) attempt: Attempt,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            attempt: Attempt::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Bearer token currently set on the request, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix(BEARER_SCHEME)?
            .strip_prefix(' ')
    }

    /// Replace the Authorization header with the given token.
    ///
    /// No token means no header: the request goes out unauthenticated and
    /// the server decides. A token that is not a valid header value is
    /// treated the same way.
    pub(crate) fn authorize(&mut self, token: Option<&Secret<String>>) {
        self.headers.remove(AUTHORIZATION);
        let Some(token) = token else {
            return;
        };
        match HeaderValue::from_str(&format!("{BEARER_SCHEME} {}", token.expose())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => {
                warn!(error = %e, "access token is not a valid header value, sending unauthenticated");
            }
        }
    }
}

/// Response handed back to the caller.
///
/// Bodies are decoded as JSON when possible, otherwise kept as a JSON string;
/// an empty body is `Value::Null`.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Synthesized body for a degraded endpoint. Looks like any other 200.
    pub(crate) fn fallback(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.body)
    }
}

/// Decode a raw response body.
pub(crate) fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn authorize_sets_bearer_header() {
        let mut request = ApiRequest::get("/leads");
        request.authorize(Some(&Secret::from("at_1")));
        assert_eq!(request.bearer_token(), Some("at_1"));
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer at_1");
    }

    #[test]
    fn authorize_without_token_removes_header() {
        let mut request = ApiRequest::get("/leads");
        request.authorize(Some(&Secret::from("at_1")));
        request.authorize(None);
        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert_eq!(request.bearer_token(), None);
    }

    #[test]
    fn authorize_skips_invalid_header_value() {
        let mut request = ApiRequest::get("/leads");
        request.authorize(Some(&Secret::from("bad\ntoken")));
        assert!(request.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn authorization_header_is_redacted_in_debug() {
        let mut request = ApiRequest::get("/leads");
        request.authorize(Some(&Secret::from("at_secret_value")));
        let debug = format!("{request:?}");
        assert!(!debug.contains("at_secret_value"), "leaked: {debug}");
    }

    #[test]
    fn builders_set_fields() {
        let request = ApiRequest::post("/tasks", json!({"title": "call back"}))
            .with_query("notify", "true");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/tasks");
        assert_eq!(request.body, Some(json!({"title": "call back"})));
        assert_eq!(request.query, vec![("notify".into(), "true".into())]);
        assert!(!request.attempt.refreshed);
        assert!(!request.attempt.stale_retried);
    }

    #[test]
    fn decode_body_variants() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_body(b"Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn typed_body() {
        #[derive(serde::Deserialize)]
        struct Page {
            total: u32,
        }
        let response = ApiResponse::new(StatusCode::OK, json!({"items": [], "total": 0}));
        let page: Page = response.json().unwrap();
        assert_eq!(page.total, 0);
    }
}
