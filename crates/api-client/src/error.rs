//! Error types returned to callers of the client
//!
//! Every rejection carries enough to render a message: the HTTP status when
//! there was a response, and the original response body.

use reqwest::StatusCode;
use serde_json::Value;

use crate::request::ApiResponse;

/// Failure of a request, after fallback and refresh handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No response at all (connection refused, DNS, timeout)
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("not found: {path}")]
    NotFound { path: String, body: Value },

    #[error("unauthorized: {path}")]
    Unauthorized { path: String, body: Value },

    #[error("forbidden: {path}")]
    Forbidden { path: String, body: Value },

    #[error("server error {status}: {path}")]
    ServerError {
        status: StatusCode,
        path: String,
        body: Value,
    },

    /// Any other non-2xx status
    #[error("request failed with {status}: {path}")]
    Status {
        status: StatusCode,
        path: String,
        body: Value,
    },

    /// The session could not be renewed; the user has to sign in again
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("credential store error: {0}")]
    Credential(String),
}

impl Error {
    /// Map a non-2xx response to the matching variant, keeping its body.
    pub fn from_response(path: &str, response: ApiResponse) -> Self {
        let path = path.to_string();
        let body = response.body;
        match response.status {
            StatusCode::NOT_FOUND => Error::NotFound { path, body },
            StatusCode::UNAUTHORIZED => Error::Unauthorized { path, body },
            StatusCode::FORBIDDEN => Error::Forbidden { path, body },
            status if status.is_server_error() => Error::ServerError { status, path, body },
            status => Error::Status { status, path, body },
        }
    }

    /// HTTP status of the rejected response, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Error::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Error::Forbidden { .. } => Some(StatusCode::FORBIDDEN),
            Error::ServerError { status, .. } | Error::Status { status, .. } => Some(*status),
            Error::NetworkUnavailable(_) | Error::RefreshFailed(_) | Error::Credential(_) => None,
        }
    }

    /// Original response body, if there was one.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Error::NotFound { body, .. }
            | Error::Unauthorized { body, .. }
            | Error::Forbidden { body, .. }
            | Error::ServerError { body, .. }
            | Error::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Human-readable detail from the response body.
    ///
    /// Looks for `detail`, `message`, then `error` (string or `{message}`),
    /// and falls back to a plain-text body.
    pub fn detail(&self) -> Option<String> {
        let body = self.body()?;
        if let Some(text) = body.as_str() {
            return (!text.is_empty()).then(|| text.to_string());
        }
        for key in ["detail", "message", "error"] {
            match body.get(key) {
                Some(Value::String(s)) => return Some(s.clone()),
                Some(Value::Object(inner)) => {
                    if let Some(Value::String(s)) = inner.get("message") {
                        return Some(s.clone());
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Metric label for the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NetworkUnavailable(_) => "network_unavailable",
            Error::NotFound { .. } => "not_found",
            Error::Unauthorized { .. } => "unauthorized",
            Error::Forbidden { .. } => "forbidden",
            Error::ServerError { .. } => "server_error",
            Error::Status { .. } => "status",
            Error::RefreshFailed(_) => "refresh_failed",
            Error::Credential(_) => "credential",
        }
    }
}

/// Failure below HTTP: no response was received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::NetworkUnavailable(err.to_string())
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: Value) -> ApiResponse {
        ApiResponse::new(StatusCode::from_u16(status).unwrap(), body)
    }

    #[test]
    fn from_response_maps_status_to_variant() {
        assert!(matches!(
            Error::from_response("/x", response(404, json!(null))),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            Error::from_response("/x", response(401, json!(null))),
            Error::Unauthorized { .. }
        ));
        assert!(matches!(
            Error::from_response("/x", response(403, json!(null))),
            Error::Forbidden { .. }
        ));
        assert!(matches!(
            Error::from_response("/x", response(502, json!(null))),
            Error::ServerError { .. }
        ));
        assert!(matches!(
            Error::from_response("/x", response(422, json!(null))),
            Error::Status { .. }
        ));
    }

    #[test]
    fn status_is_preserved() {
        let err = Error::from_response("/x", response(503, json!({})));
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(Error::RefreshFailed("x".into()).status(), None);
    }

    #[test]
    fn detail_extraction() {
        let err = Error::from_response("/x", response(403, json!({"detail": "no access"})));
        assert_eq!(err.detail().as_deref(), Some("no access"));

        let err = Error::from_response("/x", response(500, json!({"message": "boom"})));
        assert_eq!(err.detail().as_deref(), Some("boom"));

        let err = Error::from_response(
            "/x",
            response(400, json!({"error": {"message": "bad field"}})),
        );
        assert_eq!(err.detail().as_deref(), Some("bad field"));

        let err = Error::from_response("/x", response(502, json!("Bad Gateway")));
        assert_eq!(err.detail().as_deref(), Some("Bad Gateway"));

        let err = Error::from_response("/x", response(500, json!({"code": 7})));
        assert_eq!(err.detail(), None);
    }

    #[test]
    fn transport_error_becomes_network_unavailable() {
        let err: Error = TransportError::Timeout("30s".into()).into();
        assert!(matches!(err, Error::NetworkUnavailable(_)));
        assert!(err.to_string().contains("timed out"), "got: {err}");
        assert_eq!(err.kind(), "network_unavailable");
    }
}
