use std::sync::Arc;

use synccoord_core::{AppError, AppResult};
use synccoord_domain::{FencePayload, ResourceId, SyncDomain, SyncKeys};

use crate::sync_ports::CoordinationStore;

/// Fence record, task-set tracker, and generator-complete marker of one resource.
#[derive(Clone)]
pub struct ResourceSyncFence {
    store: Arc<dyn CoordinationStore>,
    domain: SyncDomain,
    resource_id: ResourceId,
    keys: SyncKeys,
}

impl ResourceSyncFence {
    /// Creates the helper for one domain and resource.
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        domain: SyncDomain,
        resource_id: ResourceId,
    ) -> Self {
        Self {
            store,
            domain,
            resource_id,
            keys: SyncKeys::new(domain),
        }
    }

    /// Domain of the fence.
    #[must_use]
    pub fn domain(&self) -> SyncDomain {
        self.domain
    }

    /// Resource of the fence.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Returns whether the fence is set.
    pub async fn fenced(&self) -> AppResult<bool> {
        Ok(self
            .store
            .get(self.keys.fence(self.resource_id).as_str())
            .await?
            .is_some())
    }

    /// Reads the fence payload.
    pub async fn payload(&self) -> AppResult<Option<FencePayload>> {
        let key = self.keys.fence(self.resource_id);
        let Some(encoded) = self.store.get(key.as_str()).await? else {
            return Ok(None);
        };

        serde_json::from_str(encoded.as_str())
            .map(Some)
            .map_err(|error| {
                AppError::Internal(format!("invalid fence payload at '{key}': {error}"))
            })
    }

    /// Writes the fence payload.
    pub async fn set_fence(&self, payload: &FencePayload) -> AppResult<()> {
        let encoded = serde_json::to_string(payload).map_err(|error| {
            AppError::Internal(format!("failed to encode fence payload: {error}"))
        })?;

        self.store
            .set(self.keys.fence(self.resource_id).as_str(), encoded.as_str())
            .await
    }

    /// Deletes the fence record.
    pub async fn clear_fence(&self) -> AppResult<()> {
        self.store
            .delete(&[self.keys.fence(self.resource_id)])
            .await
    }

    /// Adds one item token to the tracker.
    pub async fn add_task(&self, item_token: &str) -> AppResult<()> {
        self.store
            .set_add(
                self.keys.taskset(self.resource_id).as_str(),
                &[item_token.to_owned()],
            )
            .await
            .map(|_| ())
    }

    /// Removes one item token and returns whether it was still tracked.
    pub async fn remove_task(&self, item_token: &str) -> AppResult<bool> {
        self.store
            .set_remove(self.keys.taskset(self.resource_id).as_str(), item_token)
            .await
    }

    /// Number of item tokens still in flight.
    pub async fn remaining_tasks(&self) -> AppResult<u64> {
        self.store
            .set_card(self.keys.taskset(self.resource_id).as_str())
            .await
    }

    /// Count written by the generator after fan-out, if it finished.
    pub async fn generator_complete(&self) -> AppResult<Option<u64>> {
        let key = self.keys.generator_complete(self.resource_id);
        self.store
            .get(key.as_str())
            .await?
            .map(|value| {
                value.parse::<u64>().map_err(|error| {
                    AppError::Internal(format!(
                        "invalid generator complete marker '{value}' at '{key}': {error}"
                    ))
                })
            })
            .transpose()
    }

    /// Records how many items the generator dispatched.
    pub async fn set_generator_complete(&self, dispatched: u64) -> AppResult<()> {
        self.store
            .set(
                self.keys.generator_complete(self.resource_id).as_str(),
                dispatched.to_string().as_str(),
            )
            .await
    }

    /// Clears the tracker and the generator-complete marker, keeping the fence.
    pub async fn reset_tracking(&self) -> AppResult<()> {
        self.store
            .delete(&[
                self.keys.taskset(self.resource_id),
                self.keys.generator_complete(self.resource_id),
            ])
            .await
    }

    /// Clears the tracker, the generator-complete marker, and the fence.
    ///
    /// The fence goes last so the resource only becomes dispatchable once the
    /// tracking state of the old cycle is gone.
    pub async fn reset(&self) -> AppResult<()> {
        self.reset_tracking().await?;
        self.clear_fence().await
    }
}
