//! Request dispatcher
//!
//! `ApiClient::send` attaches the stored access token, sends the request
//! through the transport and routes anything that is not a 2xx through the
//! interceptor. Critical 401s go through the refresh coordinator; the
//! leader of a refresh replays every queued request before its own.
//!
//! Queued replays run on a spawned task, so a leader whose caller gives up
//! (a timeout, a `select!`) does not take the waiters down with it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use endpoint_registry::EndpointRegistry;
use futures_util::future::join_all;
use serde_json::Value;
use session_auth::{
    CredentialStore, DEFAULT_SIGN_IN_PATH, MIN_REFRESH_INTERVAL, REFRESH_PATH, RefreshRequest,
    parse_refresh_response,
};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::coordinator::{Admission, Continuation, RefreshCoordinator, RefreshLease};
use crate::error::{Error, Result};
use crate::interceptor::{Route, route};
use crate::metrics;
use crate::request::{ApiRequest, ApiResponse};
use crate::session::SessionHandler;
use crate::transport::Transport;

type ResponseFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Tunables for an `ApiClient`.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub registry: EndpointRegistry,
    /// Minimum time between two successful refreshes
    pub min_refresh_interval: Duration,
    /// Where the user is sent when the session cannot be renewed
    pub sign_in_url: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            registry: EndpointRegistry::default(),
            min_refresh_interval: MIN_REFRESH_INTERVAL,
            sign_in_url: DEFAULT_SIGN_IN_PATH.to_string(),
        }
    }
}

/// Authenticated API client.
///
/// Owns its refresh coordinator. Clones share it, so hand every task that
/// talks to the same backend a clone of one client to keep refreshes
/// single-flight.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    session: Arc<dyn SessionHandler>,
    registry: EndpointRegistry,
    coordinator: RefreshCoordinator,
    sign_in_url: String,
    /// Serializes credential writes from logins, logouts and refreshes
    session_writes: Mutex<()>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        session: Arc<dyn SessionHandler>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                credentials,
                session,
                registry: settings.registry,
                coordinator: RefreshCoordinator::new(settings.min_refresh_interval),
                sign_in_url: settings.sign_in_url,
                session_writes: Mutex::new(()),
            }),
        }
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// Send a request.
    ///
    /// Returns the response for 2xx and for degraded failures (synthesized
    /// 200). Every other outcome is an `Error` carrying the status and body.
    #[instrument(
        skip_all,
        fields(
            request_id = %uuid::Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        )
    )]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let result = self.inner.execute(request).await;
        if let Err(e) = &result {
            debug!(error = %e, "request rejected");
            metrics::record_rejection(e.kind());
        }
        result
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.send(ApiRequest::put(path, body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.send(ApiRequest::patch(path, body)).await
    }

    /// Store a freshly issued token pair (login) and start a new session.
    ///
    /// Clears a previous logged-out state, so the next refresh failure
    /// redirects again. A refresh still in flight from the previous session
    /// is superseded and leaves these tokens alone.
    pub async fn establish_session(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<()> {
        let inner = &self.inner;
        let _writes = inner.session_writes.lock().await;
        inner
            .credentials
            .set_tokens(access_token.into(), Some(refresh_token.into()))
            .await
            .map_err(|e| Error::Credential(e.to_string()))?;
        let previous = inner.coordinator.phase();
        inner.coordinator.reset();
        info!(previous_phase = previous.label(), "session established");
        Ok(())
    }

    /// Forget the stored tokens (explicit logout).
    pub async fn end_session(&self) -> Result<()> {
        let inner = &self.inner;
        let _writes = inner.session_writes.lock().await;
        inner
            .credentials
            .clear()
            .await
            .map_err(|e| Error::Credential(e.to_string()))?;
        inner.coordinator.reset();
        inner.session.logout();
        info!("session ended");
        Ok(())
    }
}

impl ClientInner {
    /// Dispatch loop for one request. Boxed because a refresh leader
    /// re-enters it to replay requests.
    fn execute(self: &Arc<Self>, mut request: ApiRequest) -> ResponseFuture<'_> {
        Box::pin(async move {
            let classification = self.registry.classify(&request.path);
            debug!(tier = classification.tier.label(), "classified");
            loop {
                let token = self.credentials.access_token().await;
                request.authorize(token.as_ref());
                let outcome = self.transport.send(&request).await;

                match route(&request, &classification, outcome) {
                    Route::Deliver(response) => return Ok(response),
                    Route::Fallback { spec, status } => {
                        if status == reqwest::StatusCode::UNAUTHORIZED {
                            warn!(path = %request.path, fallback = spec.label(), "unauthorized on non-critical endpoint, serving fallback");
                        } else {
                            debug!(path = %request.path, status = status.as_u16(), fallback = spec.label(), "serving fallback");
                        }
                        metrics::record_fallback(status.as_u16(), spec);
                        return Ok(ApiResponse::fallback(spec.render(&request.path)));
                    }
                    Route::RetryWithStoredToken => {
                        debug!(path = %request.path, "retrying once with stored token");
                        request.attempt.stale_retried = true;
                    }
                    Route::Refresh(unauthorized) => {
                        return self.refresh_and_replay(request, unauthorized).await;
                    }
                    Route::Reject(err) => return Err(err),
                }
            }
        })
    }

    async fn refresh_and_replay(
        self: &Arc<Self>,
        mut request: ApiRequest,
        unauthorized: Error,
    ) -> Result<ApiResponse> {
        let lease = match self.coordinator.admit(&request) {
            Admission::Lead(lease) => lease,
            Admission::Queued(resumed) => {
                metrics::record_queued();
                return match resumed.await {
                    Ok(result) => result,
                    Err(_) => {
                        // Leader went away before settling; start over
                        debug!(path = %request.path, "refresh abandoned, dispatching again");
                        self.execute(request).await
                    }
                };
            }
            Admission::Throttled { since_last } => {
                warn!(
                    path = %request.path,
                    since_last_ms = since_last.as_millis() as u64,
                    "refresh throttled, rejecting"
                );
                metrics::record_refresh("throttled");
                return Err(unauthorized);
            }
            Admission::LoggedOut => {
                debug!(phase = self.coordinator.phase().label(), "not refreshing");
                return Err(Error::RefreshFailed("session expired, sign in again".into()));
            }
        };

        let refreshed = self.request_tokens().await;

        let writes = self.session_writes.lock().await;
        if !lease.is_current() {
            drop(writes);
            let continuations = lease.supersede();
            info!(replaying = continuations.len(), "refresh superseded by a new session");
            metrics::record_refresh("superseded");
            self.replay_queued(continuations, false).await;
            return self.execute(request).await;
        }

        let persisted = match refreshed {
            Ok(tokens) => {
                self.credentials
                    .set_tokens(tokens.access_token, tokens.refresh_token)
                    .await
            }
            Err(e) => Err(e),
        };

        match persisted {
            Ok(()) => {
                let continuations = lease.succeed();
                drop(writes);
                info!(replaying = continuations.len(), "token refresh succeeded");
                metrics::record_refresh("success");
                self.replay_queued(continuations, true).await;

                request.attempt.refreshed = true;
                self.execute(request).await
            }
            Err(e) => {
                let failure = self.fail_refresh(lease, &e).await;
                drop(writes);
                let message = e.to_string();
                for continuation in failure {
                    let _ = continuation
                        .resume
                        .send(Err(Error::RefreshFailed(message.clone())));
                }
                Err(Error::RefreshFailed(message))
            }
        }
    }

    /// Exchange the stored refresh token for a new pair.
    async fn request_tokens(&self) -> session_auth::Result<session_auth::RefreshedTokens> {
        let refresh_token = self
            .credentials
            .refresh_token()
            .await
            .ok_or(session_auth::Error::MissingRefreshToken)?;
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: refresh_token.expose(),
        })
        .map_err(|e| session_auth::Error::TokenExchange(format!("encoding refresh body: {e}")))?;

        let response = self
            .transport
            .send(&ApiRequest::post(REFRESH_PATH, body))
            .await
            .map_err(|e| session_auth::Error::Http(e.to_string()))?;
        parse_refresh_response(response.status.as_u16(), &response.body)
    }

    /// Settle a failed refresh; the first failure of an episode expires the
    /// session. Caller holds `session_writes`.
    async fn fail_refresh(
        &self,
        lease: RefreshLease<'_>,
        error: &session_auth::Error,
    ) -> Vec<Continuation> {
        let failure = lease.fail();
        warn!(error = %error, pending = failure.continuations.len(), "token refresh failed");
        metrics::record_refresh("failure");
        if failure.issue_redirect {
            self.expire_session().await;
        }
        failure.continuations
    }

    /// Replay requests parked during the refresh. Futures are first polled
    /// in queue order, so requests go out in the order they arrived.
    ///
    /// The replays run on their own task; dropping this future only stops
    /// waiting for them.
    async fn replay_queued(self: &Arc<Self>, continuations: Vec<Continuation>, refreshed: bool) {
        if continuations.is_empty() {
            return;
        }
        let inner = Arc::clone(self);
        let replays = tokio::spawn(
            async move {
                let inner = &inner;
                let replays = continuations.into_iter().map(move |continuation| {
                    let Continuation {
                        mut request,
                        resume,
                    } = continuation;
                    let span = tracing::debug_span!("replay", path = %request.path);
                    async move {
                        request.attempt.refreshed = refreshed;
                        let result = inner.execute(request).await;
                        let _ = resume.send(result);
                    }
                    .instrument(span)
                });
                join_all(replays).await;
            }
            .in_current_span(),
        );
        if let Err(e) = replays.await {
            warn!(error = %e, "replay task failed");
        }
    }

    async fn expire_session(&self) {
        if let Err(e) = self.credentials.clear().await {
            warn!(error = %e, "failed to clear credentials after refresh failure");
        }
        self.session.logout();
        self.session.redirect_to_sign_in(&self.sign_in_url);
        info!(sign_in_url = %self.sign_in_url, "session expired, redirected to sign-in");
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("coordinator", &self.inner.coordinator)
            .field("sign_in_url", &self.inner.sign_in_url)
            .finish_non_exhaustive()
    }
}
