//! Endpoint rules and path matchers

use serde::{Deserialize, Serialize};

use crate::fallback::FallbackSpec;
use crate::{Classification, Tier};

/// How a rule recognizes a request path.
///
/// Paths are normalized before matching: query string and fragment are
/// dropped, and so is a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Path starts with the given string
    Prefix(String),
    /// Path contains the given string anywhere
    Contains(String),
    /// Single-resource path: `.../<family>/<id>`, nothing after the id
    Item(String),
}

impl Matcher {
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        match self {
            Matcher::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Matcher::Contains(needle) => path.contains(needle.as_str()),
            Matcher::Item(family) => {
                let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                match segments.as_slice() {
                    [.., parent, id] => *parent == family.as_str() && !id.is_empty(),
                    _ => false,
                }
            }
        }
    }

    fn pattern(&self) -> &str {
        match self {
            Matcher::Prefix(p) | Matcher::Contains(p) | Matcher::Item(p) => p,
        }
    }
}

/// Strip query string, fragment and trailing slash.
pub(crate) fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// One row of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRule {
    pub matcher: Matcher,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackSpec>,
    #[serde(default)]
    pub retry_stale_token: bool,
}

impl EndpointRule {
    /// Non-critical rule with the given fallback.
    pub fn degraded(matcher: Matcher, fallback: FallbackSpec) -> Self {
        Self {
            matcher,
            tier: Tier::NonCritical,
            fallback: Some(fallback),
            retry_stale_token: false,
        }
    }

    /// Critical rule whose 401s get one resend with the stored token.
    pub fn stale_token_retry(matcher: Matcher) -> Self {
        Self {
            matcher,
            tier: Tier::Critical,
            fallback: None,
            retry_stale_token: true,
        }
    }

    pub fn classification(&self) -> Classification {
        Classification {
            tier: self.tier,
            fallback: self.fallback,
            retry_stale_token: self.retry_stale_token,
        }
    }

    /// Reject rules that cannot be honored consistently.
    ///
    /// - matcher pattern must be non-empty
    /// - non-critical rules need a fallback, critical rules must not have one
    /// - the stale-token resend only applies to critical endpoints
    pub fn validate(&self) -> common::Result<()> {
        if self.matcher.pattern().trim().is_empty() {
            return Err(common::Error::EndpointRule("matcher pattern is empty".into()));
        }
        match (self.tier, self.fallback) {
            (Tier::NonCritical, None) => {
                return Err(common::Error::EndpointRule(format!(
                    "non_critical rule for {:?} has no fallback",
                    self.matcher
                )));
            }
            (Tier::Critical, Some(_)) => {
                return Err(common::Error::EndpointRule(format!(
                    "critical rule for {:?} must not declare a fallback",
                    self.matcher
                )));
            }
            _ => {}
        }
        if self.retry_stale_token && self.tier == Tier::NonCritical {
            return Err(common::Error::EndpointRule(format!(
                "retry_stale_token is only valid on critical rules ({:?})",
                self.matcher
            )));
        }
        Ok(())
    }
}
