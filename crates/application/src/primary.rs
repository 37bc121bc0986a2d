use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::distributed_lock::DistributedLock;

/// Capability describing whether this process is the elected primary worker.
///
/// Created once by the bootstrap and passed to every component that must
/// know about primacy. The held lock can be replaced by the renewal loop.
#[derive(Clone)]
pub struct PrimaryDesignation {
    lock: Option<Arc<Mutex<DistributedLock>>>,
    lock_ttl: Option<Duration>,
}

impl PrimaryDesignation {
    /// Designation of the elected primary, holding its lock.
    #[must_use]
    pub fn primary(lock: DistributedLock) -> Self {
        Self {
            lock_ttl: Some(lock.ttl()),
            lock: Some(Arc::new(Mutex::new(lock))),
        }
    }

    /// Designation of a worker that lost or skipped the election.
    #[must_use]
    pub fn secondary() -> Self {
        Self {
            lock: None,
            lock_ttl: None,
        }
    }

    /// Returns whether this process is primary.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.lock.is_some()
    }

    /// TTL of the primary lock, when primary.
    #[must_use]
    pub fn lock_ttl(&self) -> Option<Duration> {
        self.lock_ttl
    }

    pub(crate) fn lock(&self) -> Option<&Arc<Mutex<DistributedLock>>> {
        self.lock.as_ref()
    }

    /// Releases the primary lock on shutdown so a successor need not wait for expiry.
    pub async fn release(&self) {
        if let Some(lock) = &self.lock {
            lock.lock().await.release().await;
        }
    }
}
