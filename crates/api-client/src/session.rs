//! Session lifecycle hooks invoked when a refresh fails

use tracing::debug;

/// Host-side reaction to an unrecoverable session.
///
/// Called at most once per unauthenticated episode, after the credential
/// store has been cleared.
pub trait SessionHandler: Send + Sync {
    /// Drop any host-side session state.
    fn logout(&self);

    /// Send the user to the sign-in entry point.
    fn redirect_to_sign_in(&self, sign_in_url: &str);
}

/// Handler that does nothing beyond a debug log. Useful for headless callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSession;

impl SessionHandler for NoopSession {
    fn logout(&self) {
        debug!("session ended");
    }

    fn redirect_to_sign_in(&self, sign_in_url: &str) {
        debug!(sign_in_url, "sign-in required");
    }
}
