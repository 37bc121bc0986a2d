//! In-process fakes of every port, shared by the service tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{
    ConnectorType, DocumentAccess, FencePayload, QueueLane, ResourceId, ResourceStatus,
    SyncDomain, SyncResource, SyncWorkItem, TaskEnvelope, TaskPriority,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::resource_fence::ResourceSyncFence;
use crate::sync_ports::{
    CoordinationStore, DependencyProbe, DocumentIndex, IndexAttempt, IndexAttemptStatus,
    IndexDocumentUpdate, LockCoordinator, LockLease, SourceDocumentLister, StoreReplicationInfo,
    SyncRepository, TaskDelivery, TaskHandle, TaskQueue, WorkItemEnumerator,
};

fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

#[derive(Default)]
pub(crate) struct FakeCoordinationStore {
    values: Mutex<HashMap<String, String>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl FakeCoordinationStore {
    pub(crate) async fn key_count(&self) -> usize {
        self.values.lock().await.len() + self.sets.lock().await.len()
    }
}

#[async_trait]
impl CoordinationStore for FakeCoordinationStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.values
            .lock()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        let mut values = self.values.lock().await;
        let mut sets = self.sets.lock().await;
        for key in keys {
            values.remove(key);
            sets.remove(key);
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> AppResult<u64> {
        let mut sets = self.sets.lock().await;
        let set = sets.entry(key.to_owned()).or_default();
        Ok(members
            .iter()
            .filter(|member| set.insert((*member).clone()))
            .count() as u64)
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut sets = self.sets.lock().await;
        let Some(set) = sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            sets.remove(key);
        }
        Ok(removed)
    }

    async fn set_card(&self, key: &str) -> AppResult<u64> {
        Ok(self
            .sets
            .lock()
            .await
            .get(key)
            .map_or(0, |set| set.len() as u64))
    }

    async fn keys_matching(&self, pattern: &str) -> AppResult<Vec<String>> {
        let values = self.values.lock().await;
        let sets = self.sets.lock().await;
        Ok(values
            .keys()
            .chain(sets.keys())
            .filter(|key| matches_pattern(pattern, key))
            .cloned()
            .collect())
    }

    async fn delete_matching(&self, pattern: &str) -> AppResult<u64> {
        let mut values = self.values.lock().await;
        let mut sets = self.sets.lock().await;
        let before = values.len() + sets.len();
        values.retain(|key, _| !matches_pattern(pattern, key));
        sets.retain(|key, _| !matches_pattern(pattern, key));
        Ok((before - values.len() - sets.len()) as u64)
    }

    async fn replication_info(&self) -> AppResult<StoreReplicationInfo> {
        Ok(StoreReplicationInfo {
            role: "master".to_owned(),
            connected_replicas: 0,
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeLockCoordinator {
    holders: Mutex<HashMap<String, (String, Instant)>>,
    issued: Mutex<u32>,
}

impl FakeLockCoordinator {
    /// Drops a lock as if its TTL had expired.
    pub(crate) async fn expire(&self, key: &str) {
        self.holders.lock().await.remove(key);
    }
}

#[async_trait]
impl LockCoordinator for FakeLockCoordinator {
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> AppResult<Option<LockLease>> {
        let mut holders = self.holders.lock().await;
        let now = Instant::now();
        if holders
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > now)
        {
            return Ok(None);
        }

        let mut issued = self.issued.lock().await;
        *issued += 1;
        let token = format!("{holder_id}:{}", *issued);
        holders.insert(key.to_owned(), (token.clone(), now + ttl));
        Ok(Some(LockLease {
            key: key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
            ttl,
        }))
    }

    async fn reacquire(&self, lease: &LockLease) -> AppResult<bool> {
        let mut holders = self.holders.lock().await;
        let now = Instant::now();
        match holders.get_mut(lease.key.as_str()) {
            Some((token, expires_at)) if *token == lease.token && *expires_at > now => {
                *expires_at = now + lease.ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, lease: &LockLease) -> AppResult<()> {
        let mut holders = self.holders.lock().await;
        if holders
            .get(lease.key.as_str())
            .is_some_and(|(token, _)| *token == lease.token)
        {
            holders.remove(lease.key.as_str());
        }
        Ok(())
    }

    async fn owned(&self, lease: &LockLease) -> AppResult<bool> {
        Ok(self
            .holders
            .lock()
            .await
            .get(lease.key.as_str())
            .is_some_and(|(token, expires_at)| {
                *token == lease.token && *expires_at > Instant::now()
            }))
    }
}

#[derive(Default)]
pub(crate) struct FakeTaskQueue {
    queued: Mutex<VecDeque<TaskEnvelope>>,
    failing_lane: Mutex<Option<QueueLane>>,
}

impl FakeTaskQueue {
    pub(crate) async fn fail_lane(&self, lane: QueueLane) {
        *self.failing_lane.lock().await = Some(lane);
    }

    pub(crate) async fn queued(&self) -> Vec<TaskEnvelope> {
        self.queued.lock().await.iter().cloned().collect()
    }

    pub(crate) async fn pop(&self) -> Option<TaskEnvelope> {
        self.queued.lock().await.pop_front()
    }
}

#[async_trait]
impl TaskQueue for FakeTaskQueue {
    async fn send(&self, envelope: TaskEnvelope) -> AppResult<TaskHandle> {
        if *self.failing_lane.lock().await == Some(envelope.lane) {
            return Err(AppError::Unavailable(format!(
                "lane '{}' rejected task",
                envelope.lane
            )));
        }

        let handle = TaskHandle {
            task_id: envelope.task_id.clone(),
            lane: envelope.lane,
        };
        self.queued.lock().await.push_back(envelope);
        Ok(handle)
    }

    async fn receive(
        &self,
        _consumer: &str,
        lanes: &[QueueLane],
        _timeout: Duration,
    ) -> AppResult<Option<TaskDelivery>> {
        let mut queued = self.queued.lock().await;
        for priority in TaskPriority::ORDERED {
            if let Some(position) = queued
                .iter()
                .position(|envelope| envelope.priority == priority && lanes.contains(&envelope.lane))
            {
                return Ok(queued.remove(position).map(|envelope| TaskDelivery {
                    receipt: envelope.task_id.clone(),
                    envelope,
                }));
            }
        }
        Ok(None)
    }

    async fn acknowledge(&self, _consumer: &str, _delivery: &TaskDelivery) -> AppResult<()> {
        Ok(())
    }

    async fn requeue_unacknowledged(&self, _consumer: &str) -> AppResult<usize> {
        Ok(0)
    }
}

#[derive(Default)]
pub(crate) struct FakeSyncRepository {
    pub(crate) resources: Mutex<HashMap<ResourceId, SyncResource>>,
    pub(crate) attempts: Mutex<BTreeMap<i64, (IndexAttempt, Option<String>)>>,
    pub(crate) failing_attempt_updates: Mutex<HashSet<i64>>,
    pub(crate) documents: Mutex<HashMap<(ResourceId, String), String>>,
    pub(crate) access: Mutex<HashMap<(ResourceId, String), DocumentAccess>>,
    pub(crate) groups: Mutex<HashMap<(ResourceId, String), Vec<String>>>,
    pub(crate) succeeded: Mutex<Vec<(SyncDomain, ResourceId)>>,
    pub(crate) failed: Mutex<Vec<(SyncDomain, ResourceId, String)>>,
    pub(crate) candidate_delay: Mutex<Option<Duration>>,
}

impl FakeSyncRepository {
    pub(crate) async fn with_resource(self, resource: SyncResource) -> Self {
        self.resources.lock().await.insert(resource.id, resource);
        self
    }

    pub(crate) async fn attempt_status(&self, attempt_id: i64) -> Option<IndexAttemptStatus> {
        self.attempts
            .lock()
            .await
            .get(&attempt_id)
            .map(|(attempt, _)| attempt.status)
    }

    pub(crate) async fn attempt_reason(&self, attempt_id: i64) -> Option<String> {
        self.attempts
            .lock()
            .await
            .get(&attempt_id)
            .and_then(|(_, reason)| reason.clone())
    }
}

pub(crate) fn active_resource(id: i64, connector_type: ConnectorType) -> SyncResource {
    SyncResource {
        id: ResourceId::new(id),
        connector_type,
        status: ResourceStatus::Active,
        sync_period_seconds: None,
        last_indexed_at: None,
        last_permission_sync_at: None,
        last_external_group_sync_at: None,
        last_pruned_at: None,
    }
}

#[async_trait]
impl SyncRepository for FakeSyncRepository {
    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<SyncResource>> {
        Ok(self.resources.lock().await.get(&resource_id).cloned())
    }

    async fn list_sync_candidates(&self, domain: SyncDomain) -> AppResult<Vec<SyncResource>> {
        let delay = *self.candidate_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self
            .resources
            .lock()
            .await
            .values()
            .filter(|resource| match domain {
                SyncDomain::Deletion => resource.status == ResourceStatus::Deleting,
                _ => resource.status == ResourceStatus::Active,
            })
            .cloned()
            .collect())
    }

    async fn mark_sync_succeeded(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        _finished_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.succeeded.lock().await.push((domain, resource_id));
        Ok(())
    }

    async fn mark_sync_failed(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        reason: &str,
    ) -> AppResult<()> {
        self.failed
            .lock()
            .await
            .push((domain, resource_id, reason.to_owned()));
        Ok(())
    }

    async fn create_index_attempt(&self, resource_id: ResourceId) -> AppResult<i64> {
        let mut attempts = self.attempts.lock().await;
        let attempt_id = attempts.keys().next_back().map_or(1, |last| last + 1);
        attempts.insert(
            attempt_id,
            (
                IndexAttempt {
                    id: attempt_id,
                    resource_id,
                    status: IndexAttemptStatus::NotStarted,
                    created_at: Utc::now(),
                },
                None,
            ),
        );
        Ok(attempt_id)
    }

    async fn update_index_attempt(
        &self,
        attempt_id: i64,
        status: IndexAttemptStatus,
        reason: Option<&str>,
    ) -> AppResult<()> {
        if self
            .failing_attempt_updates
            .lock()
            .await
            .contains(&attempt_id)
        {
            return Err(AppError::Internal(format!(
                "database rejected update of attempt {attempt_id}"
            )));
        }

        let mut attempts = self.attempts.lock().await;
        let (attempt, stored_reason) = attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| AppError::NotFound(format!("index attempt {attempt_id}")))?;
        attempt.status = status;
        *stored_reason = reason.map(ToOwned::to_owned);
        Ok(())
    }

    async fn list_in_progress_index_attempts(&self) -> AppResult<Vec<IndexAttempt>> {
        Ok(self
            .attempts
            .lock()
            .await
            .values()
            .filter(|(attempt, _)| attempt.status.is_in_progress())
            .map(|(attempt, _)| attempt.clone())
            .collect())
    }

    async fn list_document_ids(&self, resource_id: ResourceId) -> AppResult<Vec<String>> {
        let mut document_ids: Vec<String> = self
            .documents
            .lock()
            .await
            .keys()
            .filter(|(owner, _)| *owner == resource_id)
            .map(|(_, document_id)| document_id.clone())
            .collect();
        document_ids.sort();
        Ok(document_ids)
    }

    async fn upsert_document(
        &self,
        resource_id: ResourceId,
        document_id: &str,
        title: &str,
        _source_url: Option<&str>,
    ) -> AppResult<()> {
        self.documents
            .lock()
            .await
            .insert((resource_id, document_id.to_owned()), title.to_owned());
        Ok(())
    }

    async fn upsert_document_access(
        &self,
        resource_id: ResourceId,
        document_id: &str,
        access: &DocumentAccess,
    ) -> AppResult<()> {
        self.access
            .lock()
            .await
            .insert((resource_id, document_id.to_owned()), access.clone());
        Ok(())
    }

    async fn upsert_external_group(
        &self,
        resource_id: ResourceId,
        group_id: &str,
        user_emails: &[String],
    ) -> AppResult<()> {
        self.groups
            .lock()
            .await
            .insert((resource_id, group_id.to_owned()), user_emails.to_vec());
        Ok(())
    }

    async fn delete_document(&self, resource_id: ResourceId, document_id: &str) -> AppResult<()> {
        self.documents
            .lock()
            .await
            .remove(&(resource_id, document_id.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeDocumentIndex {
    pub(crate) upserts: Mutex<Vec<IndexDocumentUpdate>>,
    pub(crate) deletes: Mutex<Vec<String>>,
    pub(crate) failing_document_ids: Mutex<HashSet<String>>,
}

#[async_trait]
impl DocumentIndex for FakeDocumentIndex {
    async fn upsert(&self, documents: &[IndexDocumentUpdate]) -> AppResult<()> {
        let failing = self.failing_document_ids.lock().await;
        if let Some(document) = documents
            .iter()
            .find(|document| failing.contains(&document.document_id))
        {
            return Err(AppError::Unavailable(format!(
                "index rejected document '{}'",
                document.document_id
            )));
        }

        self.upserts.lock().await.extend_from_slice(documents);
        Ok(())
    }

    async fn delete(&self, document_ids: &[String]) -> AppResult<()> {
        self.deletes.lock().await.extend_from_slice(document_ids);
        Ok(())
    }
}

pub(crate) struct StaticEnumerator {
    items: Vec<SyncWorkItem>,
}

impl StaticEnumerator {
    pub(crate) fn new(items: Vec<SyncWorkItem>) -> Arc<Self> {
        Arc::new(Self { items })
    }
}

#[async_trait]
impl WorkItemEnumerator for StaticEnumerator {
    async fn enumerate(&self, _resource: &SyncResource) -> AppResult<Vec<SyncWorkItem>> {
        Ok(self.items.clone())
    }
}

pub(crate) struct FailingEnumerator;

#[async_trait]
impl WorkItemEnumerator for FailingEnumerator {
    async fn enumerate(&self, resource: &SyncResource) -> AppResult<Vec<SyncWorkItem>> {
        Err(AppError::Unavailable(format!(
            "connector for resource '{}' timed out",
            resource.id
        )))
    }
}

/// Hands the fence to a newer cycle while enumerating, then fails.
pub(crate) struct TakeoverEnumerator {
    pub(crate) fence: ResourceSyncFence,
    pub(crate) newer_task_id: String,
}

#[async_trait]
impl WorkItemEnumerator for TakeoverEnumerator {
    async fn enumerate(&self, resource: &SyncResource) -> AppResult<Vec<SyncWorkItem>> {
        self.fence
            .set_fence(&FencePayload::submitted(self.newer_task_id.as_str(), Utc::now()))
            .await?;
        self.fence.add_task("newer-item").await?;

        Err(AppError::Unavailable(format!(
            "connector for resource '{}' hung then failed",
            resource.id
        )))
    }
}

/// Sleeps before answering with its items.
pub(crate) struct SlowEnumerator {
    pub(crate) delay: Duration,
    pub(crate) items: Vec<SyncWorkItem>,
}

#[async_trait]
impl WorkItemEnumerator for SlowEnumerator {
    async fn enumerate(&self, _resource: &SyncResource) -> AppResult<Vec<SyncWorkItem>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.items.clone())
    }
}

pub(crate) struct StaticSourceLister {
    pub(crate) document_ids: Vec<String>,
}

#[async_trait]
impl SourceDocumentLister for StaticSourceLister {
    async fn list_source_document_ids(&self, _resource: &SyncResource) -> AppResult<Vec<String>> {
        Ok(self.document_ids.clone())
    }
}

pub(crate) struct FakeProbe {
    name: String,
    failures_left: Mutex<u32>,
}

impl FakeProbe {
    pub(crate) fn failing_times(name: &str, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            failures_left: Mutex::new(failures),
        })
    }
}

#[async_trait]
impl DependencyProbe for FakeProbe {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn ping(&self) -> AppResult<()> {
        let mut failures_left = self.failures_left.lock().await;
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(AppError::Unavailable(format!("{} refused connection", self.name)));
        }
        Ok(())
    }
}
