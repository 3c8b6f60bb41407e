//! Terminal reaction to an expired session

use api_client::SessionHandler;
use tracing::{info, warn};

/// Tells the user on stderr to sign in again.
pub struct TerminalSession;

impl SessionHandler for TerminalSession {
    fn logout(&self) {
        info!("credentials cleared");
    }

    fn redirect_to_sign_in(&self, sign_in_url: &str) {
        warn!(sign_in_url, "session expired");
        eprintln!("Session expired. Sign in again at {sign_in_url} and run `api-cli login`.");
    }
}
