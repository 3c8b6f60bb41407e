//! Endpoint criticality registry
//!
//! Maps request paths to a criticality tier and, for non-critical endpoints,
//! the fallback body synthesized when the backend answers 404 or 401. The
//! table is data: adding an endpoint family means adding an `EndpointRule`,
//! either to `default_rules()` or through configuration.
//!
//! Unknown paths are `Critical`. A path is only ever degraded because a rule
//! says so.

pub mod fallback;
pub mod registry;
pub mod rule;

pub use fallback::{FallbackSpec, TASK_STAND_IN_TITLE};
pub use registry::{EndpointRegistry, default_rules};
pub use rule::{EndpointRule, Matcher};

use serde::{Deserialize, Serialize};

/// Whether a failure on an endpoint is surfaced or degraded in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Failures reach the caller; 401s go through token refresh
    Critical,
    /// 404/401 are replaced by the rule's fallback body
    NonCritical,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::NonCritical => "non_critical",
        }
    }
}

/// Result of classifying a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub tier: Tier,
    /// Always `Some` for non-critical endpoints, `None` for critical ones
    pub fallback: Option<FallbackSpec>,
    /// Resend a 401 once with the currently stored token before refreshing
    pub retry_stale_token: bool,
}

impl Classification {
    /// Fail-closed default for paths no rule matches.
    pub fn critical() -> Self {
        Self {
            tier: Tier::Critical,
            fallback: None,
            retry_stale_token: false,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.tier == Tier::Critical
    }
}
