//! Ordered rule table and path classification

use tracing::info;

use crate::fallback::FallbackSpec;
use crate::rule::{EndpointRule, Matcher};
use crate::Classification;

/// Built-in endpoint families.
///
/// Order matters: the first matching rule wins, so single-resource rules sit
/// before the collection rule of the same family, and the settings rules sit
/// before `/users`.
pub fn default_rules() -> Vec<EndpointRule> {
    use FallbackSpec::*;

    let contains = |s: &str| Matcher::Contains(s.to_string());
    let item = |s: &str| Matcher::Item(s.to_string());

    vec![
        EndpointRule::degraded(item("tasks"), TaskStandIn),
        EndpointRule::degraded(contains("/tasks"), EmptyList),
        EndpointRule::degraded(contains("/notifications"), EmptyList),
        EndpointRule::degraded(contains("/lead-stages"), EmptyList),
        EndpointRule::degraded(contains("/leads"), EmptyList),
        EndpointRule::degraded(contains("/organization/settings"), EmptySettings),
        EndpointRule::degraded(contains("/users/me/settings"), EmptyObject),
        EndpointRule::degraded(contains("/users"), EmptyList),
        EndpointRule::degraded(contains("/currencies"), EmptyList),
        EndpointRule::degraded(contains("/tags"), EmptyList),
        EndpointRule::degraded(contains("/roles"), EmptyList),
        EndpointRule::degraded(contains("/information-requests"), EmptyList),
        EndpointRule::degraded(contains("/activities"), EmptyList),
        EndpointRule::stale_token_retry(item("organizations")),
    ]
}

/// Ordered list of endpoint rules.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    rules: Vec<EndpointRule>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl EndpointRegistry {
    /// Registry with exactly these rules, in order.
    pub fn new(rules: Vec<EndpointRule>) -> Self {
        Self { rules }
    }

    /// Default rules with `overrides` checked first.
    ///
    /// Each override is validated; the first invalid one is returned as an error.
    pub fn with_overrides(overrides: Vec<EndpointRule>) -> common::Result<Self> {
        for rule in &overrides {
            rule.validate()?;
        }
        if !overrides.is_empty() {
            info!(rules = overrides.len(), "loaded endpoint rule overrides");
        }
        let mut rules = overrides;
        rules.extend(default_rules());
        Ok(Self::new(rules))
    }

    /// Classify a request path. Unmatched paths are critical.
    pub fn classify(&self, path: &str) -> Classification {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(path))
            .map(EndpointRule::classification)
            .unwrap_or_else(Classification::critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tier;

    fn fallback_for(path: &str) -> Option<FallbackSpec> {
        EndpointRegistry::default().classify(path).fallback
    }

    #[test]
    fn default_rules_are_valid() {
        for rule in default_rules() {
            rule.validate().unwrap();
        }
    }

    #[test]
    fn single_task_gets_stand_in_and_collection_gets_envelope() {
        assert_eq!(fallback_for("/tasks/42"), Some(FallbackSpec::TaskStandIn));
        assert_eq!(fallback_for("/tasks"), Some(FallbackSpec::EmptyList));
        assert_eq!(fallback_for("/tasks?status=open"), Some(FallbackSpec::EmptyList));
        assert_eq!(fallback_for("/tasks/42/comments"), Some(FallbackSpec::EmptyList));
    }

    #[test]
    fn every_non_critical_family_is_registered() {
        let lists = [
            "/notifications",
            "/leads",
            "/leads/9",
            "/users",
            "/currencies",
            "/tags",
            "/roles",
            "/lead-stages",
            "/information-requests",
            "/activities",
        ];
        for path in lists {
            assert_eq!(fallback_for(path), Some(FallbackSpec::EmptyList), "{path}");
        }
        assert_eq!(
            fallback_for("/organization/settings"),
            Some(FallbackSpec::EmptySettings)
        );
        assert_eq!(fallback_for("/users/me/settings"), Some(FallbackSpec::EmptyObject));
    }

    #[test]
    fn unknown_paths_are_critical() {
        let registry = EndpointRegistry::default();
        for path in ["/billing/invoices", "/projects/3", "/", ""] {
            let c = registry.classify(path);
            assert_eq!(c, Classification::critical(), "{path}");
        }
    }

    #[test]
    fn organization_detail_is_critical_with_stale_retry() {
        let c = EndpointRegistry::default().classify("/organizations/7");
        assert_eq!(c.tier, Tier::Critical);
        assert!(c.retry_stale_token);
        assert!(c.fallback.is_none());

        let list = EndpointRegistry::default().classify("/organizations");
        assert!(!list.retry_stale_token);
    }

    #[test]
    fn classify_is_idempotent() {
        let registry = EndpointRegistry::default();
        for path in ["/tasks/42", "/tasks", "/billing/invoices", "/organizations/7"] {
            assert_eq!(registry.classify(path), registry.classify(path), "{path}");
        }
    }

    #[test]
    fn overrides_take_precedence() {
        let registry = EndpointRegistry::with_overrides(vec![
            EndpointRule::degraded(Matcher::Prefix("/billing".into()), FallbackSpec::EmptyObject),
            EndpointRule {
                matcher: Matcher::Contains("/tags".into()),
                tier: Tier::Critical,
                fallback: None,
                retry_stale_token: false,
            },
        ])
        .unwrap();

        assert_eq!(
            registry.classify("/billing/invoices").fallback,
            Some(FallbackSpec::EmptyObject)
        );
        assert!(registry.classify("/tags").is_critical());
        // Defaults still apply behind the overrides
        assert_eq!(
            registry.classify("/tasks/1").fallback,
            Some(FallbackSpec::TaskStandIn)
        );
    }

    #[test]
    fn invalid_override_is_rejected() {
        let result = EndpointRegistry::with_overrides(vec![EndpointRule {
            matcher: Matcher::Contains("/reports".into()),
            tier: Tier::NonCritical,
            fallback: None,
            retry_stale_token: false,
        }]);
        assert!(matches!(result, Err(common::Error::EndpointRule(_))));
    }
}
