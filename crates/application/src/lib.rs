//! Application services and ports for connector sync coordination.

#![forbid(unsafe_code)]

mod bootstrap_service;
mod distributed_lock;
mod enumerators;
mod primary;
mod renewal;
mod resource_fence;
mod schedule;
mod sync_ports;
mod sync_service;

#[cfg(test)]
mod test_support;

pub use bootstrap_service::{
    BootstrapConfig, BootstrapOutcome, BootstrapState, ORPHANED_ATTEMPT_REASON,
    PrimaryWorkerBootstrap,
};
pub use distributed_lock::DistributedLock;
pub use enumerators::{DeletionEnumerator, PruningEnumerator};
pub use primary::PrimaryDesignation;
pub use renewal::{PrimaryLockRenewal, RenewalHandle, RenewalTick};
pub use resource_fence::ResourceSyncFence;
pub use schedule::SyncSchedule;
pub use sync_ports::{
    CoordinationStore, DependencyProbe, DocumentIndex, EnumeratorRegistry, IndexAttempt,
    IndexAttemptStatus, IndexDocumentUpdate, LockCoordinator, LockLease, SourceDocumentLister,
    StoreReplicationInfo, SyncRepository, TaskDelivery, TaskHandle, TaskQueue,
    WorkItemEnumerator,
};
pub use sync_service::{
    BeatJob, BeatOutcome, FenceStatus, GeneratorOutcome, SyncCoordinatorService, SyncSettings,
    SyncTaskRouter,
};
