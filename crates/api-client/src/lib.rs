//! Resilient authenticated API client
//!
//! Wraps a `Transport` with three behaviours every caller would otherwise
//! reimplement:
//!
//! - Non-critical endpoints (per `endpoint_registry`) degrade to a
//!   synthesized 200 on 404/401 instead of failing the caller.
//! - A critical 401 triggers exactly one token refresh no matter how many
//!   requests fail concurrently; the others wait and are replayed in order.
//! - A failed refresh clears the credentials and redirects to sign-in once.
//!
//! ```text
//! caller ──send──▶ ApiClient ──▶ Transport ──▶ backend
//!                     │  ▲
//!            non-2xx  ▼  │ replay
//!               interceptor ──401──▶ RefreshCoordinator ──▶ POST /auth/refresh
//! ```

pub mod client;
pub mod coordinator;
pub mod error;
pub(crate) mod interceptor;
pub mod metrics;
pub mod request;
pub mod session;
pub mod transport;

pub use client::{ApiClient, ClientSettings};
pub use coordinator::{RefreshCoordinator, RefreshPhase};
pub use error::{Error, Result, TransportError};
pub use request::{ApiRequest, ApiResponse};
pub use session::{NoopSession, SessionHandler};
pub use transport::{ReqwestTransport, Transport, TransportFuture};
