mod document_index;
mod enumerator;
mod lock;
mod probe;
mod queue;
mod repository;
mod store;

pub use document_index::{DocumentIndex, IndexDocumentUpdate};
pub use enumerator::{EnumeratorRegistry, SourceDocumentLister, WorkItemEnumerator};
pub use lock::{LockCoordinator, LockLease};
pub use probe::DependencyProbe;
pub use queue::{TaskDelivery, TaskHandle, TaskQueue};
pub use repository::{IndexAttempt, IndexAttemptStatus, SyncRepository};
pub use store::{CoordinationStore, StoreReplicationInfo};
