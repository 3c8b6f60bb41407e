//! Scripted in-process backend and session doubles for client tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_client::{
    ApiClient, ApiRequest, ApiResponse, ClientSettings, SessionHandler, Transport,
    TransportError, TransportFuture,
};
use common::Secret;
use reqwest::StatusCode;
use serde_json::{Value, json};
use session_auth::{CredentialStore, MemoryCredentialStore, REFRESH_PATH, StoreFuture};
use tokio::sync::Semaphore;

/// How the backend answers the next refresh call.
pub enum RefreshReply {
    Tokens {
        access: &'static str,
        refresh: Option<&'static str>,
    },
    Status(u16, Value),
    NetworkDown,
}

/// One request as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub path: String,
    pub bearer: Option<String>,
}

/// Backend that accepts exactly one access token.
///
/// Requests carrying the valid token get `200 {"path": ...}`, anything else
/// gets `401`. Per-path overrides answer regardless of the token. Refresh
/// calls pop scripted replies and can be held on a gate so tests can pile
/// requests up behind them.
pub struct FakeBackend {
    valid_token: Mutex<String>,
    refresh_replies: Mutex<VecDeque<RefreshReply>>,
    refresh_calls: AtomicUsize,
    refresh_bodies: Mutex<Vec<Value>>,
    overrides: Mutex<HashMap<String, (u16, Value)>>,
    slow_success: Mutex<HashMap<String, Duration>>,
    network_down: AtomicBool,
    gate: Option<Semaphore>,
    seen: Mutex<Vec<Seen>>,
}

impl FakeBackend {
    pub fn new(valid_token: &str) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_replies: Mutex::new(VecDeque::new()),
            refresh_calls: AtomicUsize::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            overrides: Mutex::new(HashMap::new()),
            slow_success: Mutex::new(HashMap::new()),
            network_down: AtomicBool::new(false),
            gate: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Hold every refresh call until `open_gate` is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1_000);
        }
    }

    pub fn push_refresh(&self, reply: RefreshReply) {
        self.refresh_replies.lock().unwrap().push_back(reply);
    }

    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.overrides
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body));
    }

    /// Delay the successful answer for `path`; 401s still come back at once.
    pub fn slow_success(&self, path: &str, delay: Duration) {
        self.slow_success
            .lock()
            .unwrap()
            .insert(path.to_string(), delay);
    }

    pub fn set_valid_token(&self, token: &str) {
        *self.valid_token.lock().unwrap() = token.to_string();
    }

    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_bodies(&self) -> Vec<Value> {
        self.refresh_bodies.lock().unwrap().clone()
    }

    /// Every non-refresh request in the order it reached the backend.
    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    /// Paths that reached the backend carrying `token`, in order.
    pub fn paths_with_token(&self, token: &str) -> Vec<String> {
        self.seen()
            .into_iter()
            .filter(|s| s.bearer.as_deref() == Some(token))
            .map(|s| s.path)
            .collect()
    }

    async fn refresh(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_bodies
            .lock()
            .unwrap()
            .push(request.body.clone().unwrap_or(Value::Null));
        assert!(
            request.bearer_token().is_none(),
            "refresh call must not be authenticated"
        );

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }

        let reply = self
            .refresh_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RefreshReply::Status(503, json!({"detail": "no scripted reply"})));
        match reply {
            RefreshReply::Tokens { access, refresh } => {
                self.set_valid_token(access);
                let mut body = json!({ "access_token": access });
                if let Some(refresh) = refresh {
                    body["refresh_token"] = json!(refresh);
                }
                Ok(ApiResponse::new(StatusCode::OK, body))
            }
            RefreshReply::Status(status, body) => Ok(ApiResponse::new(
                StatusCode::from_u16(status).unwrap(),
                body,
            )),
            RefreshReply::NetworkDown => Err(TransportError::Timeout("refresh timed out".into())),
        }
    }
}

impl Transport for FakeBackend {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        Box::pin(async move {
            if request.path == REFRESH_PATH {
                return self.refresh(request).await;
            }

            let bearer = request.bearer_token().map(str::to_string);
            self.seen.lock().unwrap().push(Seen {
                path: request.path.clone(),
                bearer: bearer.clone(),
            });

            if self.network_down.load(Ordering::SeqCst) {
                return Err(TransportError::Connect("connection refused".into()));
            }
            if let Some((status, body)) = self.overrides.lock().unwrap().get(&request.path) {
                return Ok(ApiResponse::new(
                    StatusCode::from_u16(*status).unwrap(),
                    body.clone(),
                ));
            }
            let valid = self.valid_token.lock().unwrap().clone();
            if bearer.as_deref() == Some(valid.as_str()) {
                let delay = self.slow_success.lock().unwrap().get(&request.path).copied();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(ApiResponse::new(
                    StatusCode::OK,
                    json!({ "path": request.path }),
                ))
            } else {
                Ok(ApiResponse::new(
                    StatusCode::UNAUTHORIZED,
                    json!({ "detail": "token expired" }),
                ))
            }
        })
    }
}

/// Counts logout and redirect calls.
#[derive(Default)]
pub struct RecordingSession {
    logouts: AtomicUsize,
    redirects: Mutex<Vec<String>>,
}

impl RecordingSession {
    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl SessionHandler for RecordingSession {
    fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
    }

    fn redirect_to_sign_in(&self, sign_in_url: &str) {
        self.redirects.lock().unwrap().push(sign_in_url.to_string());
    }
}

/// Store whose access token changes between reads, as if another tab
/// refreshed the session while a request was in flight.
pub struct SequencedStore {
    access: Mutex<VecDeque<String>>,
}

impl SequencedStore {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            access: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
        }
    }
}

impl CredentialStore for SequencedStore {
    fn access_token(&self) -> StoreFuture<'_, Option<Secret<String>>> {
        Box::pin(async move {
            let mut access = self.access.lock().unwrap();
            let token = if access.len() > 1 {
                access.pop_front()
            } else {
                access.front().cloned()
            };
            token.map(Secret::new)
        })
    }

    fn refresh_token(&self) -> StoreFuture<'_, Option<Secret<String>>> {
        Box::pin(async move { Some(Secret::from("rt_1")) })
    }

    fn last_refresh_at(&self) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move { None })
    }

    fn set_tokens(
        &self,
        access: String,
        _refresh: Option<String>,
    ) -> StoreFuture<'_, session_auth::Result<()>> {
        Box::pin(async move {
            *self.access.lock().unwrap() = VecDeque::from([access]);
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, session_auth::Result<()>> {
        Box::pin(async move {
            self.access.lock().unwrap().clear();
            Ok(())
        })
    }
}

/// Client wired to the given doubles, with default settings and a
/// recognizable sign-in URL.
pub struct Harness {
    pub client: Arc<ApiClient>,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MemoryCredentialStore>,
    pub session: Arc<RecordingSession>,
}

pub const SIGN_IN_URL: &str = "https://crm.example.com/sign-in";

impl Harness {
    pub fn new(backend: FakeBackend, store: MemoryCredentialStore) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(store);
        let session = Arc::new(RecordingSession::default());
        let settings = ClientSettings {
            sign_in_url: SIGN_IN_URL.to_string(),
            ..ClientSettings::default()
        };
        let client = Arc::new(ApiClient::new(
            backend.clone(),
            store.clone(),
            session.clone(),
            settings,
        ));
        Self {
            client,
            backend,
            store,
            session,
        }
    }

    /// Backend accepting `at_new`, store holding the expired `at_old`.
    pub fn expired_session() -> Self {
        Self::new(
            FakeBackend::new("at_new"),
            MemoryCredentialStore::with_tokens("at_old", "rt_1"),
        )
    }

    pub fn spawn_get(&self, path: &str) -> tokio::task::JoinHandle<api_client::Result<ApiResponse>> {
        let client = self.client.clone();
        let path = path.to_string();
        tokio::spawn(async move { client.get(&path).await })
    }
}

/// Yield until `condition` holds. Spawned tasks run between checks.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
