//! Client counters
//!
//! - `api_client_token_refresh_total` (counter): label `outcome` (`success`, `failure`, `throttled`, `superseded`)
//! - `api_client_refresh_queued_total` (counter)
//! - `api_client_fallbacks_total` (counter): labels `status`, `fallback`
//! - `api_client_rejections_total` (counter): label `kind`
//!
//! The library never installs a recorder; without one these calls are no-ops.

use endpoint_registry::FallbackSpec;

/// Record the outcome of a refresh attempt.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("api_client_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request parked behind an in-flight refresh.
pub fn record_queued() {
    metrics::counter!("api_client_refresh_queued_total").increment(1);
}

/// Record a failure replaced by a synthesized body.
pub fn record_fallback(status: u16, fallback: FallbackSpec) {
    metrics::counter!(
        "api_client_fallbacks_total",
        "status" => status.to_string(),
        "fallback" => fallback.label()
    )
    .increment(1);
}

/// Record an error surfaced to the caller.
pub fn record_rejection(kind: &'static str) {
    metrics::counter!("api_client_rejections_total", "kind" => kind).increment(1);
}
