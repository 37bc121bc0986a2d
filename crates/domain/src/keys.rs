//! Key naming for coordination state.
//!
//! Adapters prepend their own namespace prefix; names here are relative.

use crate::{ResourceId, SyncDomain};

/// Cluster-wide primary worker lock.
pub const PRIMARY_WORKER_LOCK_KEY: &str = "primary_worker";

const COMPLETION_MONITOR_BEAT_LOCK_KEY: &str = "completion_monitor_beat_lock";

/// Key names for one domain's fences, trackers, and locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncKeys {
    domain: SyncDomain,
}

impl SyncKeys {
    /// Creates the key namer for one domain.
    #[must_use]
    pub fn new(domain: SyncDomain) -> Self {
        Self { domain }
    }

    /// Fence record of one resource.
    #[must_use]
    pub fn fence(&self, resource_id: ResourceId) -> String {
        format!("{}_fence:{resource_id}", self.domain)
    }

    /// Task-set tracker of one resource.
    #[must_use]
    pub fn taskset(&self, resource_id: ResourceId) -> String {
        format!("{}_taskset:{resource_id}", self.domain)
    }

    /// Generator-complete marker holding the dispatched count.
    #[must_use]
    pub fn generator_complete(&self, resource_id: ResourceId) -> String {
        format!("{}_generator_complete:{resource_id}", self.domain)
    }

    /// Processing lock held by a running generator.
    #[must_use]
    pub fn generator_lock(&self, resource_id: ResourceId) -> String {
        format!("{}_generator_lock:{resource_id}", self.domain)
    }

    /// Glob pattern matching every fence of the domain.
    #[must_use]
    pub fn fence_pattern(&self) -> String {
        format!("{}_fence:*", self.domain)
    }

    /// Extracts the resource id from a fence key of this domain.
    #[must_use]
    pub fn parse_fence_key(&self, key: &str) -> Option<ResourceId> {
        let prefix = format!("{}_fence:", self.domain);
        key.strip_prefix(prefix.as_str())?.parse().ok()
    }

    /// Short-lived mutual exclusion around the fence check-then-set of one resource.
    ///
    /// Shared by every domain so cross-domain blocking checks cannot interleave.
    #[must_use]
    pub fn dispatch_lock(resource_id: ResourceId) -> String {
        format!("fence_lock:dispatch:{resource_id}")
    }

    /// Beat lock preventing overlapping scans.
    #[must_use]
    pub fn beat_lock(&self) -> String {
        format!("{}_beat_lock", self.domain)
    }

    /// Beat lock preventing overlapping monitor sweeps.
    #[must_use]
    pub fn completion_monitor_beat_lock() -> &'static str {
        COMPLETION_MONITOR_BEAT_LOCK_KEY
    }

    /// Glob patterns covering every per-resource coordination key of the domain.
    ///
    /// Dispatch and beat locks are excluded; they expire on their own.
    /// Processing locks are included so a crashed generator cannot block
    /// the first dispatch after a restart.
    #[must_use]
    pub fn reset_patterns(&self) -> Vec<String> {
        vec![
            self.fence_pattern(),
            format!("{}_taskset:*", self.domain),
            format!("{}_generator_complete:*", self.domain),
            format!("{}_generator_lock:*", self.domain),
        ]
    }
}
