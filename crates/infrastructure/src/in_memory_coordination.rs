//! Process-local coordination backends for single-worker deployments and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use synccoord_application::{
    CoordinationStore, LockCoordinator, LockLease, StoreReplicationInfo, TaskDelivery, TaskHandle,
    TaskQueue,
};
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{QueueLane, TaskEnvelope, TaskPriority};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Set(BTreeSet<String>),
}

/// In-memory coordination store.
#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    values: RwLock<BTreeMap<String, StoredValue>>,
}

impl InMemoryCoordinationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::Internal(format!("key '{key}' holds a value of another type"))
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        match self.values.read().await.get(key) {
            None => Ok(None),
            Some(StoredValue::Text(value)) => Ok(Some(value.clone())),
            Some(StoredValue::Set(_)) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_owned(), StoredValue::Text(value.to_owned()));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        let mut values = self.values.write().await;
        for key in keys {
            values.remove(key);
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> AppResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut values = self.values.write().await;
        let entry = values
            .entry(key.to_owned())
            .or_insert_with(|| StoredValue::Set(BTreeSet::new()));
        let StoredValue::Set(set) = entry else {
            return Err(wrong_type(key));
        };

        let added = members
            .iter()
            .filter(|member| set.insert((*member).clone()))
            .count();
        Ok(added as u64)
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut values = self.values.write().await;
        let removed = match values.get_mut(key) {
            None => return Ok(false),
            Some(StoredValue::Text(_)) => return Err(wrong_type(key)),
            Some(StoredValue::Set(set)) => set.remove(member),
        };

        // Empty sets vanish, matching Redis.
        if matches!(values.get(key), Some(StoredValue::Set(set)) if set.is_empty()) {
            values.remove(key);
        }

        Ok(removed)
    }

    async fn set_card(&self, key: &str) -> AppResult<u64> {
        match self.values.read().await.get(key) {
            None => Ok(0),
            Some(StoredValue::Set(set)) => Ok(set.len() as u64),
            Some(StoredValue::Text(_)) => Err(wrong_type(key)),
        }
    }

    async fn keys_matching(&self, pattern: &str) -> AppResult<Vec<String>> {
        Ok(self
            .values
            .read()
            .await
            .keys()
            .filter(|key| glob_matches(pattern, key))
            .cloned()
            .collect())
    }

    async fn delete_matching(&self, pattern: &str) -> AppResult<u64> {
        let mut values = self.values.write().await;
        let before = values.len();
        values.retain(|key, _| !glob_matches(pattern, key));
        Ok((before - values.len()) as u64)
    }

    async fn replication_info(&self) -> AppResult<StoreReplicationInfo> {
        Ok(StoreReplicationInfo {
            role: "standalone".to_owned(),
            connected_replicas: 0,
        })
    }
}

/// Glob matching with `*` and `?`, the subset coordination patterns use.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let (mut p, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
            }
            Some('?') => {
                p += 1;
                c += 1;
            }
            Some(expected) if *expected == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    c = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|remaining| *remaining == '*')
}

#[derive(Debug)]
struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// In-memory lock coordinator with owner tokens and expiry.
#[derive(Debug, Default)]
pub struct InMemoryLockCoordinator {
    locks: Mutex<HashMap<String, HeldLock>>,
}

impl InMemoryLockCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockCoordinator for InMemoryLockCoordinator {
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> AppResult<Option<LockLease>> {
        if ttl.is_zero() {
            return Err(AppError::Validation("lock ttl must be positive".to_owned()));
        }

        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|held| held.expires_at > now) {
            return Ok(None);
        }

        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        locks.insert(
            key.to_owned(),
            HeldLock {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );

        Ok(Some(LockLease {
            key: key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
            ttl,
        }))
    }

    async fn reacquire(&self, lease: &LockLease) -> AppResult<bool> {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        match locks.get_mut(lease.key.as_str()) {
            Some(held) if held.token == lease.token && held.expires_at > now => {
                held.expires_at = now + lease.ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, lease: &LockLease) -> AppResult<()> {
        let mut locks = self.locks.lock().await;
        if locks
            .get(lease.key.as_str())
            .is_some_and(|held| held.token == lease.token)
        {
            locks.remove(lease.key.as_str());
        }
        Ok(())
    }

    async fn owned(&self, lease: &LockLease) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self
            .locks
            .lock()
            .await
            .get(lease.key.as_str())
            .is_some_and(|held| held.token == lease.token && held.expires_at > now))
    }
}

/// In-memory task queue with lanes and priorities.
///
/// Received tasks are kept per consumer until acknowledged.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    lists: Mutex<HashMap<(QueueLane, TaskPriority), VecDeque<TaskEnvelope>>>,
    in_flight: Mutex<HashMap<String, Vec<TaskEnvelope>>>,
    arrivals: Notify,
}

impl InMemoryTaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn pop(&self, lanes: &[QueueLane]) -> Option<TaskEnvelope> {
        let mut lists = self.lists.lock().await;
        for priority in TaskPriority::ORDERED {
            for lane in lanes {
                if let Some(envelope) = lists
                    .get_mut(&(*lane, priority))
                    .and_then(VecDeque::pop_front)
                {
                    return Some(envelope);
                }
            }
        }
        None
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn send(&self, envelope: TaskEnvelope) -> AppResult<TaskHandle> {
        let handle = TaskHandle {
            task_id: envelope.task_id.clone(),
            lane: envelope.lane,
        };

        self.lists
            .lock()
            .await
            .entry((envelope.lane, envelope.priority))
            .or_default()
            .push_back(envelope);
        self.arrivals.notify_waiters();

        Ok(handle)
    }

    async fn receive(
        &self,
        consumer: &str,
        lanes: &[QueueLane],
        timeout: Duration,
    ) -> AppResult<Option<TaskDelivery>> {
        let deadline = Instant::now() + timeout;

        loop {
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if let Some(envelope) = self.pop(lanes).await {
                self.in_flight
                    .lock()
                    .await
                    .entry(consumer.to_owned())
                    .or_default()
                    .push(envelope.clone());
                return Ok(Some(TaskDelivery {
                    receipt: envelope.task_id.clone(),
                    envelope,
                }));
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn acknowledge(&self, consumer: &str, delivery: &TaskDelivery) -> AppResult<()> {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(pending) = in_flight.get_mut(consumer)
            && let Some(position) = pending
                .iter()
                .position(|envelope| envelope.task_id == delivery.receipt)
        {
            pending.remove(position);
            if pending.is_empty() {
                in_flight.remove(consumer);
            }
        }
        Ok(())
    }

    async fn requeue_unacknowledged(&self, consumer: &str) -> AppResult<usize> {
        let Some(pending) = self.in_flight.lock().await.remove(consumer) else {
            return Ok(0);
        };

        let requeued = pending.len();
        {
            let mut lists = self.lists.lock().await;
            // Oldest delivery ends up first in line.
            for envelope in pending.into_iter().rev() {
                lists
                    .entry((envelope.lane, envelope.priority))
                    .or_default()
                    .push_front(envelope);
            }
        }
        self.arrivals.notify_waiters();

        Ok(requeued)
    }
}
