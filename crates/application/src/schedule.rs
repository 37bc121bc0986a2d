//! Due-time predicate for scheduled sync scans.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use synccoord_domain::{ConnectorType, ResourceStatus, SyncDomain, SyncResource};

/// Default sync period of every domain, in seconds.
const DEFAULT_PERIOD_SECONDS: [(SyncDomain, u32); 4] = [
    (SyncDomain::Indexing, 30 * 60),
    (SyncDomain::PermissionSync, 6 * 60 * 60),
    (SyncDomain::ExternalGroupSync, 6 * 60 * 60),
    (SyncDomain::Pruning, 24 * 60 * 60),
];

/// Per-domain sync periods with connector and resource overrides.
///
/// Resolution order: the resource's own period, then the connector type
/// override, then the domain default.
#[derive(Debug, Clone)]
pub struct SyncSchedule {
    domain_periods: HashMap<SyncDomain, u32>,
    connector_periods: HashMap<(SyncDomain, ConnectorType), u32>,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            domain_periods: DEFAULT_PERIOD_SECONDS.into_iter().collect(),
            connector_periods: HashMap::new(),
        }
    }
}

impl SyncSchedule {
    /// Overrides a domain's default period.
    #[must_use]
    pub fn with_domain_period(mut self, domain: SyncDomain, period_seconds: u32) -> Self {
        self.domain_periods.insert(domain, period_seconds);
        self
    }

    /// Overrides the period of one connector type within a domain.
    #[must_use]
    pub fn with_connector_period(
        mut self,
        domain: SyncDomain,
        connector_type: ConnectorType,
        period_seconds: u32,
    ) -> Self {
        self.connector_periods
            .insert((domain, connector_type), period_seconds);
        self
    }

    /// Effective period for one resource.
    #[must_use]
    pub fn period_for(&self, domain: SyncDomain, resource: &SyncResource) -> Option<Duration> {
        resource
            .sync_period_seconds
            .or_else(|| {
                self.connector_periods
                    .get(&(domain, resource.connector_type))
                    .copied()
            })
            .or_else(|| self.domain_periods.get(&domain).copied())
            .map(|seconds| Duration::seconds(i64::from(seconds)))
    }

    /// Returns whether the resource should be dispatched now.
    ///
    /// Deletion is due whenever the resource is marked for deletion. Other
    /// domains require an active resource whose last successful run is
    /// missing or older than its period.
    #[must_use]
    pub fn is_due(&self, domain: SyncDomain, resource: &SyncResource, now: DateTime<Utc>) -> bool {
        if domain == SyncDomain::Deletion {
            return resource.status == ResourceStatus::Deleting;
        }

        if resource.status != ResourceStatus::Active {
            return false;
        }

        let Some(period) = self.period_for(domain, resource) else {
            return false;
        };

        match resource.last_synced_at(domain) {
            None => true,
            Some(last) => now.signed_duration_since(last) >= period,
        }
    }
}
