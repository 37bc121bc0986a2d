use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{
    FencePayload, QueueLane, ResourceId, SyncDomain, SyncKeys, SyncResource, SyncTask,
    SyncWorkItem, TaskEnvelope, TaskPriority, WorkItemPayload,
};
use tracing::{debug, error, info, warn};

use crate::distributed_lock::DistributedLock;
use crate::primary::PrimaryDesignation;
use crate::resource_fence::ResourceSyncFence;
use crate::schedule::SyncSchedule;
use crate::sync_ports::{
    CoordinationStore, DocumentIndex, EnumeratorRegistry, IndexAttemptStatus,
    IndexDocumentUpdate, LockCoordinator, SyncRepository, TaskQueue,
};

mod beat;
mod dispatch;
mod generator;
mod monitor;
mod router;
mod scan;
mod subtask;

#[cfg(test)]
mod tests;

pub use beat::{BeatJob, BeatOutcome};
pub use generator::GeneratorOutcome;
pub use monitor::FenceStatus;
pub use router::SyncTaskRouter;

const DEFAULT_FENCE_TIMEOUT_HOURS: i64 = 6;

/// Timing knobs of the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// TTL of the per-resource dispatch lock; dispatch blocks for half of it.
    pub dispatch_lock_ttl: Duration,
    /// TTL of the generator processing lock.
    pub generator_lock_ttl: Duration,
    /// TTL of beat locks and the upper bound of one scan or sweep.
    pub beat_timeout: Duration,
    /// Whether scans and monitor sweeps run only on the primary worker.
    pub beat_requires_primary: bool,
    fence_timeouts: HashMap<SyncDomain, chrono::Duration>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            dispatch_lock_ttl: Duration::from_secs(30),
            generator_lock_ttl: Duration::from_secs(60 * 60),
            beat_timeout: Duration::from_secs(5 * 60),
            beat_requires_primary: true,
            fence_timeouts: HashMap::new(),
        }
    }
}

impl SyncSettings {
    /// Overrides how long a domain's fence may live before the monitor fails it.
    #[must_use]
    pub fn with_fence_timeout(mut self, domain: SyncDomain, timeout: chrono::Duration) -> Self {
        self.fence_timeouts.insert(domain, timeout);
        self
    }

    /// Fence timeout of one domain.
    #[must_use]
    pub fn fence_timeout(&self, domain: SyncDomain) -> chrono::Duration {
        self.fence_timeouts
            .get(&domain)
            .copied()
            .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_FENCE_TIMEOUT_HOURS))
    }
}

/// Scan, dispatch, generator, subtask, and monitor logic for every sync domain.
#[derive(Clone)]
pub struct SyncCoordinatorService {
    store: Arc<dyn CoordinationStore>,
    locks: Arc<dyn LockCoordinator>,
    queue: Arc<dyn TaskQueue>,
    repository: Arc<dyn SyncRepository>,
    document_index: Arc<dyn DocumentIndex>,
    enumerators: EnumeratorRegistry,
    schedule: SyncSchedule,
    settings: SyncSettings,
    worker_id: String,
}

impl SyncCoordinatorService {
    /// Creates the coordinator with default schedule and settings.
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        locks: Arc<dyn LockCoordinator>,
        queue: Arc<dyn TaskQueue>,
        repository: Arc<dyn SyncRepository>,
        document_index: Arc<dyn DocumentIndex>,
        enumerators: EnumeratorRegistry,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            locks,
            queue,
            repository,
            document_index,
            enumerators,
            schedule: SyncSchedule::default(),
            settings: SyncSettings::default(),
            worker_id: worker_id.into(),
        }
    }

    /// Replaces the due predicate.
    #[must_use]
    pub fn with_schedule(mut self, schedule: SyncSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Replaces timing settings.
    #[must_use]
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Timing settings in effect.
    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn fence(&self, domain: SyncDomain, resource_id: ResourceId) -> ResourceSyncFence {
        ResourceSyncFence::new(self.store.clone(), domain, resource_id)
    }

    fn lock(&self, key: String, ttl: Duration) -> DistributedLock {
        DistributedLock::new(self.locks.clone(), key, self.worker_id.as_str(), ttl)
    }

    async fn finish_index_attempt(
        &self,
        attempt_id: Option<i64>,
        status: IndexAttemptStatus,
        reason: Option<&str>,
    ) {
        let Some(attempt_id) = attempt_id else {
            return;
        };

        if let Err(error) = self
            .repository
            .update_index_attempt(attempt_id, status, reason)
            .await
        {
            error!(
                index_attempt_id = attempt_id,
                status = status.as_str(),
                error = %error,
                "failed to update index attempt"
            );
        }
    }
}
