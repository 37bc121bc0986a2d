use std::time::Duration;

use async_trait::async_trait;
use synccoord_core::AppResult;

/// One held distributed lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// Lock key.
    pub key: String,
    /// Owner token used for compare-and-delete and compare-and-expire.
    pub token: String,
    /// Holder identity.
    pub holder_id: String,
    /// Time to live applied on acquire and on every reacquire.
    pub ttl: Duration,
}

/// Distributed lock port with owner-token semantics.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Attempts once to take the lock.
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> AppResult<Option<LockLease>>;

    /// Extends the lock's TTL and returns false when the token no longer owns it.
    async fn reacquire(&self, lease: &LockLease) -> AppResult<bool>;

    /// Releases the lock when the token still owns it.
    async fn release(&self, lease: &LockLease) -> AppResult<()>;

    /// Returns whether the token currently owns the lock.
    async fn owned(&self, lease: &LockLease) -> AppResult<bool>;
}
