//! Domain entities and invariants for connector sync coordination.

#![forbid(unsafe_code)]

mod fence;
mod keys;
mod resource;
mod sync_domain;
mod task;
mod work_item;

pub use fence::FencePayload;
pub use keys::{PRIMARY_WORKER_LOCK_KEY, SyncKeys};
pub use resource::{ConnectorType, ResourceId, ResourceStatus, SyncResource};
pub use sync_domain::SyncDomain;
pub use task::{QueueLane, SyncTask, TaskEnvelope, TaskPriority};
pub use work_item::{DocumentAccess, SyncWorkItem, WorkItemPayload};
