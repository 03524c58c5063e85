//! Authorization metrics.
//!
//! The PDP records every decision outcome and the latency of database-path
//! evaluations. The registry is held in application state; exposition is a
//! deployment concern handled elsewhere.

use std::sync::{Arc, Mutex};

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Outcome label for an authorization check
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum AuthzResult {
    Granted,
    DeniedNotMember,
    DeniedNoPermission,
    L1CacheHit,
    L2CacheHit,
    CacheMiss,
    CacheDisabled,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AuthzCheckLabels {
    pub result: AuthzResult,
    pub resource: String,
    pub action: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AuthzDurationLabels {
    pub resource: String,
    pub action: String,
}

/// Process-wide metrics, initialized once at startup
#[derive(Clone)]
pub struct Metrics {
    #[allow(dead_code)]
    registry: Arc<Mutex<Registry>>,
    authz_checks: Family<AuthzCheckLabels, Counter>,
    authz_check_duration_seconds: Family<AuthzDurationLabels, Histogram>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let authz_checks = Family::<AuthzCheckLabels, Counter>::default();
        registry.register(
            "authz_checks",
            "Authorization check outcomes",
            authz_checks.clone(),
        );

        let authz_check_duration_seconds =
            Family::<AuthzDurationLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 12))
            });
        registry.register(
            "authz_check_duration_seconds",
            "Database-path authorization decision latency",
            authz_check_duration_seconds.clone(),
        );

        Self {
            registry: Arc::new(Mutex::new(registry)),
            authz_checks,
            authz_check_duration_seconds,
        }
    }

    pub fn track_authz_check(&self, result: AuthzResult, resource: &str, action: &str) {
        self.authz_checks
            .get_or_create(&AuthzCheckLabels {
                result,
                resource: resource.to_string(),
                action: action.to_string(),
            })
            .inc();
    }

    pub fn observe_authz_duration(&self, resource: &str, action: &str, seconds: f64) {
        self.authz_check_duration_seconds
            .get_or_create(&AuthzDurationLabels {
                resource: resource.to_string(),
                action: action.to_string(),
            })
            .observe(seconds);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record_without_panicking() {
        let metrics = Metrics::new();
        metrics.track_authz_check(AuthzResult::Granted, "activity", "create");
        metrics.track_authz_check(AuthzResult::DeniedNotMember, "activity", "create");
        metrics.track_authz_check(AuthzResult::L1CacheHit, "activity", "read");
        metrics.observe_authz_duration("activity", "create", 0.012);
    }
}
