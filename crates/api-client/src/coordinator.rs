//! Single-flight token refresh coordination
//!
//! At most one refresh is in flight per client. The first critical 401 to
//! reach an idle coordinator becomes the leader and receives a
//! `RefreshLease`; every 401 that arrives while the lease is held is queued
//! as a `Continuation` and resumed, in arrival order, once the lease settles.
//!
//! State lives behind a `std::sync::Mutex` that is only taken for short,
//! synchronous sections. The refresh call itself happens with the lock
//! released; the `Refreshing` phase is what keeps a second refresh out.
//!
//! Every new session bumps a generation counter. A lease taken under an
//! older generation is superseded: its result must not touch the new
//! session's credentials or log it out.
//!
//! Phases:
//!
//! ```text
//! Idle ──401──▶ Refreshing ──ok──▶ Idle
//!                   │
//!                   └──fail──▶ LoggedOut ──establish_session──▶ Idle
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use session_auth::MIN_REFRESH_INTERVAL;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::request::{ApiRequest, ApiResponse};

/// Where the coordinator is in the refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
    /// A refresh failed; requests are rejected until a new session is established
    LoggedOut,
}

impl RefreshPhase {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshPhase::Idle => "idle",
            RefreshPhase::Refreshing => "refreshing",
            RefreshPhase::LoggedOut => "logged_out",
        }
    }
}

/// A request parked until the in-flight refresh settles.
pub(crate) struct Continuation {
    pub request: ApiRequest,
    pub resume: oneshot::Sender<Result<ApiResponse>>,
}

/// Outcome of asking the coordinator for permission to refresh.
pub(crate) enum Admission<'a> {
    /// Caller performs the refresh and must settle the lease
    Lead(RefreshLease<'a>),
    /// A refresh is already running; await the replayed response
    Queued(oneshot::Receiver<Result<ApiResponse>>),
    /// The last successful refresh was too recent to try again
    Throttled { since_last: Duration },
    LoggedOut,
}

/// Result of a failed refresh.
pub(crate) struct RefreshFailure {
    pub continuations: Vec<Continuation>,
    /// True only for the first failure of an unauthenticated episode
    pub issue_redirect: bool,
}

struct RefreshState {
    phase: RefreshPhase,
    pending: VecDeque<Continuation>,
    last_success_at: Option<Instant>,
    redirect_issued: bool,
    generation: u64,
}

/// Serializes token refreshes for one client.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    min_interval: Duration,
}

impl RefreshCoordinator {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            state: Mutex::new(RefreshState {
                phase: RefreshPhase::Idle,
                pending: VecDeque::new(),
                last_success_at: None,
                redirect_issued: false,
                generation: 0,
            }),
            min_interval,
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        self.lock().phase
    }

    /// Number of requests waiting on the in-flight refresh.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn redirect_issued(&self) -> bool {
        self.lock().redirect_issued
    }

    /// Decide what a request that hit a critical 401 should do.
    pub(crate) fn admit(&self, request: &ApiRequest) -> Admission<'_> {
        let mut state = self.lock();
        match state.phase {
            RefreshPhase::LoggedOut => Admission::LoggedOut,
            RefreshPhase::Refreshing => {
                let (resume, receiver) = oneshot::channel();
                state.pending.push_back(Continuation {
                    request: request.clone(),
                    resume,
                });
                debug!(path = %request.path, pending = state.pending.len(), "queued behind in-flight refresh");
                Admission::Queued(receiver)
            }
            RefreshPhase::Idle => {
                if let Some(last) = state.last_success_at {
                    let since_last = last.elapsed();
                    if since_last < self.min_interval {
                        return Admission::Throttled { since_last };
                    }
                }
                state.phase = RefreshPhase::Refreshing;
                Admission::Lead(RefreshLease {
                    coordinator: self,
                    generation: state.generation,
                    settled: false,
                })
            }
        }
    }

    /// Start a new session: return to `Idle` and supersede any lease taken
    /// before this call.
    ///
    /// An in-flight refresh keeps the phase at `Refreshing` until its lease
    /// settles, so new 401s keep queueing instead of starting a second refresh.
    pub fn reset(&self) {
        let mut state = self.lock();
        if state.phase != RefreshPhase::Refreshing {
            state.phase = RefreshPhase::Idle;
        }
        state.redirect_issued = false;
        state.generation += 1;
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new(MIN_REFRESH_INTERVAL)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RefreshCoordinator")
            .field("phase", &state.phase)
            .field("pending", &state.pending.len())
            .field("redirect_issued", &state.redirect_issued)
            .field("generation", &state.generation)
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

/// Exclusive right to perform the refresh.
///
/// Must be settled with `succeed`, `fail` or `supersede`. Dropping an
/// unsettled lease returns the coordinator to `Idle` and drops the queue;
/// waiters see their channel close and dispatch their request again.
pub(crate) struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    generation: u64,
    settled: bool,
}

impl RefreshLease<'_> {
    /// False once a new session was established after this lease was taken.
    pub fn is_current(&self) -> bool {
        self.coordinator.lock().generation == self.generation
    }

    /// Settle a lease whose session was replaced mid-refresh.
    ///
    /// Returns to `Idle` without recording a success or a logout and hands
    /// back the queue so it can be replayed with the new session's token.
    pub fn supersede(mut self) -> Vec<Continuation> {
        self.settled = true;
        let mut state = self.coordinator.lock();
        state.phase = RefreshPhase::Idle;
        state.pending.drain(..).collect()
    }

    /// Mark the refresh successful and hand back the queue in FIFO order.
    pub fn succeed(mut self) -> Vec<Continuation> {
        self.settled = true;
        let mut state = self.coordinator.lock();
        state.phase = RefreshPhase::Idle;
        state.last_success_at = Some(Instant::now());
        state.redirect_issued = false;
        state.pending.drain(..).collect()
    }

    /// Mark the refresh failed and hand back the queue.
    pub fn fail(mut self) -> RefreshFailure {
        self.settled = true;
        let mut state = self.coordinator.lock();
        state.phase = RefreshPhase::LoggedOut;
        let issue_redirect = !state.redirect_issued;
        state.redirect_issued = true;
        RefreshFailure {
            continuations: state.pending.drain(..).collect(),
            issue_redirect,
        }
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.coordinator.lock();
        state.phase = RefreshPhase::Idle;
        let dropped = state.pending.len();
        state.pending.clear();
        debug!(dropped, "refresh abandoned before settling");
    }
}
