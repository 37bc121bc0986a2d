use async_trait::async_trait;
use synccoord_core::AppResult;

/// Replication topology reported by the coordination store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReplicationInfo {
    /// Role of the node the worker talks to, e.g. `master` or `replica`.
    pub role: String,
    /// Number of replicas connected to that node.
    pub connected_replicas: u32,
}

/// Shared key-value store holding fences, trackers, and markers.
///
/// Implementations provide no multi-key transactions; callers order their
/// writes so that every interleaving stays safe.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Reads one string value.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Writes one string value without expiry.
    async fn set(&self, key: &str, value: &str) -> AppResult<()>;

    /// Deletes keys; missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> AppResult<()>;

    /// Adds members to a set and returns how many were new.
    async fn set_add(&self, key: &str, members: &[String]) -> AppResult<u64>;

    /// Removes one member from a set and returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> AppResult<bool>;

    /// Returns the size of a set; missing sets are empty.
    async fn set_card(&self, key: &str) -> AppResult<u64>;

    /// Returns every key matching a glob pattern.
    ///
    /// Implementations iterate incrementally and never block the store.
    async fn keys_matching(&self, pattern: &str) -> AppResult<Vec<String>>;

    /// Deletes every key matching a glob pattern and returns the count.
    async fn delete_matching(&self, pattern: &str) -> AppResult<u64>;

    /// Returns replication topology for operational logging.
    async fn replication_info(&self) -> AppResult<StoreReplicationInfo>;
}
