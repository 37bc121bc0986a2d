use std::sync::Arc;
use std::time::Duration;

use synccoord_core::AppResult;
use tokio::time::Instant;
use tracing::warn;

use crate::sync_ports::{LockCoordinator, LockLease};

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Named lock with acquire, reacquire, release, and ownership checks.
pub struct DistributedLock {
    coordinator: Arc<dyn LockCoordinator>,
    key: String,
    holder_id: String,
    ttl: Duration,
    lease: Option<LockLease>,
}

impl DistributedLock {
    /// Creates an unheld lock handle.
    #[must_use]
    pub fn new(
        coordinator: Arc<dyn LockCoordinator>,
        key: impl Into<String>,
        holder_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            coordinator,
            key: key.into(),
            holder_id: holder_id.into(),
            ttl,
            lease: None,
        }
    }

    /// Lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Lock time to live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns whether this handle believes it holds a lease.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.lease.is_some()
    }

    /// Takes the lock, retrying until `blocking_timeout` elapses.
    ///
    /// `None` makes a single attempt. A successful acquire replaces any lease
    /// this handle held before.
    pub async fn acquire(&mut self, blocking_timeout: Option<Duration>) -> AppResult<bool> {
        let deadline = blocking_timeout.map(|timeout| Instant::now() + timeout);

        loop {
            if let Some(lease) = self
                .coordinator
                .try_acquire(self.key.as_str(), self.holder_id.as_str(), self.ttl)
                .await?
            {
                self.lease = Some(lease);
                return Ok(true);
            }

            let Some(deadline) = deadline else {
                return Ok(false);
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }

            tokio::time::sleep(ACQUIRE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Extends the TTL; false means the lock is already lost.
    pub async fn reacquire(&self) -> AppResult<bool> {
        match &self.lease {
            Some(lease) => self.coordinator.reacquire(lease).await,
            None => Ok(false),
        }
    }

    /// Best-effort ownership hint.
    pub async fn owned(&self) -> AppResult<bool> {
        match &self.lease {
            Some(lease) => self.coordinator.owned(lease).await,
            None => Ok(false),
        }
    }

    /// Releases the lock if held. Failures are logged, never returned.
    pub async fn release(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };

        if let Err(error) = self.coordinator.release(&lease).await {
            warn!(lock_key = %lease.key, error = %error, "failed to release lock");
        }
    }
}
