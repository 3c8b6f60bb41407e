//! Authentication constants shared by the client and the CLI

use std::time::Duration;

/// Path of the token refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Default sign-in entry point used when a refresh fails
pub const DEFAULT_SIGN_IN_PATH: &str = "/sign-in";

/// Minimum time between two successful refreshes.
///
/// A critical 401 arriving sooner than this after a successful refresh refers
/// to a token that is already known to be bad; it is rejected instead of
/// starting another refresh.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Authorization scheme used for the access token
pub const BEARER_SCHEME: &str = "Bearer";
