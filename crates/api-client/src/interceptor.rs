//! Routing of responses that are not plain successes
//!
//! Pure decision function: given the request, its classification and what
//! the transport returned, say what the client does next. The client
//! performs the side effects (fallback synthesis, resend, refresh).

use endpoint_registry::{Classification, FallbackSpec};
use reqwest::StatusCode;

use crate::error::{Error, TransportError};
use crate::request::{ApiRequest, ApiResponse};

pub(crate) enum Route {
    /// 2xx, hand back unchanged
    Deliver(ApiResponse),
    /// Replace the failure with a synthesized 200
    Fallback {
        spec: FallbackSpec,
        status: StatusCode,
    },
    /// Resend once with whatever token the store holds now
    RetryWithStoredToken,
    /// Hand to the refresh coordinator; carries the 401 to surface if refused
    Refresh(Error),
    Reject(Error),
}

pub(crate) fn route(
    request: &ApiRequest,
    classification: &Classification,
    outcome: Result<ApiResponse, TransportError>,
) -> Route {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => return Route::Reject(e.into()),
    };
    if response.is_success() {
        return Route::Deliver(response);
    }

    let status = response.status;
    let degraded = classification
        .fallback
        .filter(|_| !classification.is_critical());

    match status {
        StatusCode::NOT_FOUND => match degraded {
            Some(spec) => Route::Fallback { spec, status },
            None => Route::Reject(Error::from_response(&request.path, response)),
        },
        StatusCode::UNAUTHORIZED => {
            let attempt = request.attempt;
            if classification.retry_stale_token && !attempt.stale_retried && !attempt.refreshed {
                return Route::RetryWithStoredToken;
            }
            if let Some(spec) = degraded {
                return Route::Fallback { spec, status };
            }
            let err = Error::from_response(&request.path, response);
            if attempt.refreshed {
                Route::Reject(err)
            } else {
                Route::Refresh(err)
            }
        }
        _ => Route::Reject(Error::from_response(&request.path, response)),
    }
}
