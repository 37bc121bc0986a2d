use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use synccoord_core::AppError;
use synccoord_domain::{
    ConnectorType, DocumentAccess, FencePayload, QueueLane, ResourceId, ResourceStatus,
    SyncDomain, SyncTask, SyncWorkItem, TaskPriority, WorkItemPayload,
};

use crate::distributed_lock::DistributedLock;
use crate::enumerators::DeletionEnumerator;
use crate::primary::PrimaryDesignation;
use crate::resource_fence::ResourceSyncFence;
use crate::sync_ports::{EnumeratorRegistry, IndexAttemptStatus, SyncRepository};
use crate::test_support::{
    FailingEnumerator, FakeCoordinationStore, FakeDocumentIndex, FakeLockCoordinator,
    FakeSyncRepository, FakeTaskQueue, SlowEnumerator, StaticEnumerator, TakeoverEnumerator,
    active_resource,
};

use super::{
    BeatJob, BeatOutcome, FenceStatus, GeneratorOutcome, SyncCoordinatorService, SyncSettings,
    SyncTaskRouter,
};

fn access_item(document_id: &str, email: &str) -> SyncWorkItem {
    SyncWorkItem {
        document_id: document_id.to_owned(),
        payload: WorkItemPayload::ExternalAccess {
            access: DocumentAccess {
                external_user_emails: vec![email.to_owned()],
                external_user_group_ids: Vec::new(),
                is_public: false,
            },
        },
    }
}

fn abc_items() -> Vec<SyncWorkItem> {
    vec![
        access_item("a", "ana@example.com"),
        access_item("b", "bo@example.com"),
        access_item("c", "cy@example.com"),
    ]
}

struct Harness {
    store: Arc<FakeCoordinationStore>,
    locks: Arc<FakeLockCoordinator>,
    queue: Arc<FakeTaskQueue>,
    repository: Arc<FakeSyncRepository>,
    index: Arc<FakeDocumentIndex>,
    service: SyncCoordinatorService,
}

impl Harness {
    async fn new(enumerators: impl FnOnce(Arc<FakeSyncRepository>) -> EnumeratorRegistry) -> Self {
        Self::over_store(Arc::new(FakeCoordinationStore::default()), enumerators).await
    }

    async fn over_store(
        store: Arc<FakeCoordinationStore>,
        enumerators: impl FnOnce(Arc<FakeSyncRepository>) -> EnumeratorRegistry,
    ) -> Self {
        let repository = Arc::new(
            FakeSyncRepository::default()
                .with_resource(active_resource(42, ConnectorType::Confluence))
                .await
                .with_resource(active_resource(7, ConnectorType::Confluence))
                .await,
        );
        let locks = Arc::new(FakeLockCoordinator::default());
        let queue = Arc::new(FakeTaskQueue::default());
        let index = Arc::new(FakeDocumentIndex::default());
        let service = SyncCoordinatorService::new(
            store.clone(),
            locks.clone(),
            queue.clone(),
            repository.clone(),
            index.clone(),
            enumerators(repository.clone()),
            "worker-a",
        );

        Self {
            store,
            locks,
            queue,
            repository,
            index,
            service,
        }
    }

    async fn with_items(items: Vec<SyncWorkItem>) -> Self {
        Self::new(|_| {
            EnumeratorRegistry::new().with(
                SyncDomain::PermissionSync,
                ConnectorType::Confluence,
                StaticEnumerator::new(items),
            )
        })
        .await
    }

    fn fence(&self, domain: SyncDomain, id: i64) -> ResourceSyncFence {
        ResourceSyncFence::new(self.store.clone(), domain, ResourceId::new(id))
    }

    async fn drain_queue(&self) {
        let router = SyncTaskRouter::new(self.service.clone());
        while let Some(envelope) = self.queue.pop().await {
            let executed = router.execute(&envelope).await;
            assert!(executed.is_ok(), "task {} failed", envelope.task_id);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_dispatch_enqueues_exactly_one_generator() {
    let harness = Harness::with_items(abc_items()).await;

    let mut attempts = Vec::new();
    for _ in 0..8 {
        let service = harness.service.clone();
        attempts.push(tokio::spawn(async move {
            service
                .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
                .await
        }));
    }

    let mut triggered = 0;
    for attempt in attempts {
        if let Ok(Ok(Some(_))) = attempt.await {
            triggered += 1;
        }
    }

    assert_eq!(triggered, 1);
    let queued = harness.queue.queued().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].lane, QueueLane::SyncGenerator);
    assert_eq!(queued[0].priority, TaskPriority::High);
}

#[tokio::test]
async fn dispatch_writes_fence_owned_by_the_enqueued_generator() {
    let harness = Harness::with_items(abc_items()).await;
    let stale = harness.fence(SyncDomain::PermissionSync, 42);
    assert!(stale.add_task("leftover").await.is_ok());
    assert!(stale.set_generator_complete(5).await.is_ok());

    let task_id = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

    let payload = stale.payload().await.ok().flatten();
    assert!(payload
        .as_ref()
        .is_some_and(|payload| payload.is_owned_by(&task_id) && payload.started.is_none()));
    assert_eq!(stale.remaining_tasks().await.ok(), Some(0));
    assert_eq!(stale.generator_complete().await.ok(), Some(None));
    assert!(task_id.starts_with("permission_sync_generator_42_"));
}

#[tokio::test]
async fn failed_enqueue_clears_the_fence() {
    let harness = Harness::with_items(abc_items()).await;
    harness.queue.fail_lane(QueueLane::SyncGenerator).await;

    let dispatched = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await;

    assert!(matches!(dispatched, Err(AppError::Unavailable(_))));
    assert!(!harness
        .fence(SyncDomain::PermissionSync, 42)
        .fenced()
        .await
        .unwrap_or(true));
}

#[tokio::test]
async fn delete_fence_blocks_permission_sync_until_cleared() {
    let harness = Harness::with_items(abc_items()).await;
    let delete_fence = harness.fence(SyncDomain::Deletion, 7);
    assert!(delete_fence
        .set_fence(&FencePayload::submitted("deletion_generator_7", Utc::now()))
        .await
        .is_ok());

    let blocked = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(7))
        .await;
    assert!(matches!(blocked, Ok(None)));
    assert!(harness.queue.queued().await.is_empty());

    assert!(delete_fence.clear_fence().await.is_ok());
    let allowed = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(7))
        .await;
    assert!(matches!(allowed, Ok(Some(_))));
}

#[tokio::test]
async fn permission_sync_of_resource_42_completes_end_to_end() {
    let harness = Harness::with_items(abc_items()).await;
    let fence = harness.fence(SyncDomain::PermissionSync, 42);

    let task_id = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    assert_eq!(
        harness
            .service
            .check_fence(SyncDomain::PermissionSync, ResourceId::new(42))
            .await
            .ok(),
        Some(FenceStatus::Generating)
    );

    let generator = harness.queue.pop().await;
    let router = SyncTaskRouter::new(harness.service.clone());
    assert!(generator.is_some_and(|envelope| envelope.task_id == task_id));
    assert!(harness
        .service
        .run_generator(SyncDomain::PermissionSync, ResourceId::new(42), &task_id)
        .await
        .is_ok_and(|outcome| outcome == GeneratorOutcome::Dispatched(3)));

    let items = harness.queue.queued().await;
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|envelope| envelope.lane == QueueLane::SyncItems
        && envelope.priority == TaskPriority::Medium
        && matches!(&envelope.task, SyncTask::ProcessItem { generator_task_id, .. }
            if *generator_task_id == task_id)));
    assert_eq!(fence.remaining_tasks().await.ok(), Some(3));
    assert_eq!(fence.generator_complete().await.ok(), Some(Some(3)));
    assert!(fence
        .payload()
        .await
        .ok()
        .flatten()
        .is_some_and(|payload| payload.started.is_some()));

    if let Some(envelope) = harness.queue.pop().await {
        assert!(router.execute(&envelope).await.is_ok());
    }
    assert_eq!(
        harness
            .service
            .check_fence(SyncDomain::PermissionSync, ResourceId::new(42))
            .await
            .ok(),
        Some(FenceStatus::Draining(2))
    );

    harness.drain_queue().await;
    assert_eq!(harness.service.monitor_fences().await.ok(), Some(1));

    assert!(!fence.fenced().await.unwrap_or(true));
    assert_eq!(harness.store.key_count().await, 0);
    assert_eq!(
        *harness.repository.succeeded.lock().await,
        vec![(SyncDomain::PermissionSync, ResourceId::new(42))]
    );
    assert_eq!(harness.repository.access.lock().await.len(), 3);
    assert_eq!(harness.index.upserts.lock().await.len(), 3);
}

#[tokio::test]
async fn failing_items_still_release_their_tokens() {
    let harness = Harness::with_items(abc_items()).await;
    harness
        .index
        .failing_document_ids
        .lock()
        .await
        .insert("b".to_owned());

    let dispatched = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await;
    assert!(matches!(dispatched, Ok(Some(_))));
    harness.drain_queue().await;

    let fence = harness.fence(SyncDomain::PermissionSync, 42);
    assert_eq!(fence.remaining_tasks().await.ok(), Some(0));
    assert_eq!(harness.service.monitor_fences().await.ok(), Some(1));
    assert_eq!(harness.index.upserts.lock().await.len(), 2);
}

#[tokio::test]
async fn empty_tracker_without_count_is_not_complete() {
    let harness = Harness::with_items(abc_items()).await;
    let fence = harness.fence(SyncDomain::PermissionSync, 42);
    assert!(fence
        .set_fence(&FencePayload::submitted("generator-1", Utc::now()).with_started(Utc::now()))
        .await
        .is_ok());
    assert!(fence.add_task("token-a").await.is_ok());
    assert!(fence.remove_task("token-a").await.unwrap_or(false));

    assert_eq!(
        harness
            .service
            .check_fence(SyncDomain::PermissionSync, ResourceId::new(42))
            .await
            .ok(),
        Some(FenceStatus::Generating)
    );
    assert!(fence.fenced().await.unwrap_or(false));

    assert!(fence.set_generator_complete(1).await.is_ok());
    assert_eq!(
        harness
            .service
            .check_fence(SyncDomain::PermissionSync, ResourceId::new(42))
            .await
            .ok(),
        Some(FenceStatus::Succeeded)
    );
}

#[tokio::test]
async fn generator_failure_rolls_back_every_key() {
    let harness = Harness::new(|_| {
        EnumeratorRegistry::new().with(
            SyncDomain::PermissionSync,
            ConnectorType::Confluence,
            Arc::new(FailingEnumerator),
        )
    })
    .await;

    let task_id = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    let outcome = harness
        .service
        .run_generator(SyncDomain::PermissionSync, ResourceId::new(42), &task_id)
        .await;

    assert!(matches!(outcome, Err(AppError::Unavailable(_))));
    assert_eq!(harness.store.key_count().await, 0);
    assert_eq!(harness.repository.failed.lock().await.len(), 1);

    let redispatched = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await;
    assert!(matches!(redispatched, Ok(Some(_))));
}

#[tokio::test]
async fn item_enqueue_failure_mid_fan_out_rolls_back_tracker() {
    let harness = Harness::with_items(abc_items()).await;
    let task_id = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    harness.queue.fail_lane(QueueLane::SyncItems).await;

    let outcome = harness
        .service
        .run_generator(SyncDomain::PermissionSync, ResourceId::new(42), &task_id)
        .await;

    assert!(outcome.is_err());
    assert_eq!(harness.store.key_count().await, 0);
}

#[tokio::test]
async fn stale_generator_leaves_the_new_cycle_alone() {
    let harness = Harness::with_items(abc_items()).await;
    let fence = harness.fence(SyncDomain::PermissionSync, 42);
    assert!(fence
        .set_fence(&FencePayload::submitted("newer-generator", Utc::now()))
        .await
        .is_ok());

    let outcome = harness
        .service
        .run_generator(SyncDomain::PermissionSync, ResourceId::new(42), "older-generator")
        .await;

    assert!(matches!(outcome, Err(AppError::Conflict(_))));
    assert!(fence
        .payload()
        .await
        .ok()
        .flatten()
        .is_some_and(|payload| payload.is_owned_by("newer-generator") && payload.started.is_none()));
    assert!(harness.queue.queued().await.is_empty());
}

#[tokio::test]
async fn generator_exits_quietly_when_processing_lock_is_held() {
    let harness = Harness::with_items(abc_items()).await;
    let task_id = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

    let mut running = DistributedLock::new(
        harness.locks.clone(),
        synccoord_domain::SyncKeys::new(SyncDomain::PermissionSync)
            .generator_lock(ResourceId::new(42)),
        "worker-b",
        Duration::from_secs(60),
    );
    assert!(running.acquire(None).await.unwrap_or(false));

    let outcome = harness
        .service
        .run_generator(SyncDomain::PermissionSync, ResourceId::new(42), &task_id)
        .await;

    assert!(matches!(outcome, Ok(GeneratorOutcome::AlreadyRunning)));
    assert!(harness
        .fence(SyncDomain::PermissionSync, 42)
        .fenced()
        .await
        .unwrap_or(false));
}

#[tokio::test]
async fn timed_out_fence_is_failed_and_cleared() {
    let harness = Harness::with_items(abc_items()).await;
    let service = harness.service.clone().with_settings(
        SyncSettings::default()
            .with_fence_timeout(SyncDomain::PermissionSync, chrono::Duration::minutes(30)),
    );
    let fence = harness.fence(SyncDomain::PermissionSync, 42);
    assert!(fence
        .set_fence(&FencePayload::submitted(
            "lost-generator",
            Utc::now() - chrono::Duration::hours(1)
        ))
        .await
        .is_ok());

    assert_eq!(
        service
            .check_fence(SyncDomain::PermissionSync, ResourceId::new(42))
            .await
            .ok(),
        Some(FenceStatus::TimedOut)
    );
    assert!(!fence.fenced().await.unwrap_or(true));
    assert_eq!(harness.repository.failed.lock().await.len(), 1);
}

#[tokio::test]
async fn indexing_cycle_tracks_its_index_attempt() {
    let harness = Harness::new(|_| {
        EnumeratorRegistry::new().with(
            SyncDomain::Indexing,
            ConnectorType::Confluence,
            StaticEnumerator::new(vec![SyncWorkItem {
                document_id: "page-1".to_owned(),
                payload: WorkItemPayload::IndexDocument {
                    title: "Runbook".to_owned(),
                    content: "restart the worker".to_owned(),
                    source_url: None,
                },
            }]),
        )
    })
    .await;

    let dispatched = harness
        .service
        .try_dispatch(SyncDomain::Indexing, ResourceId::new(42))
        .await;
    assert!(matches!(dispatched, Ok(Some(_))));
    assert_eq!(
        harness.repository.attempt_status(1).await,
        Some(IndexAttemptStatus::NotStarted)
    );

    harness.drain_queue().await;
    assert_eq!(
        harness.repository.attempt_status(1).await,
        Some(IndexAttemptStatus::InProgress)
    );

    assert_eq!(harness.service.monitor_fences().await.ok(), Some(1));
    assert_eq!(
        harness.repository.attempt_status(1).await,
        Some(IndexAttemptStatus::Succeeded)
    );
    assert_eq!(harness.repository.documents.lock().await.len(), 1);
}

#[tokio::test]
async fn deletion_removes_documents_from_index_and_database() {
    let harness = Harness::new(|repository| {
        EnumeratorRegistry::new().with(
            SyncDomain::Deletion,
            ConnectorType::Confluence,
            Arc::new(DeletionEnumerator::new(repository)),
        )
    })
    .await;
    for document_id in ["x", "y"] {
        assert!(harness
            .repository
            .upsert_document(ResourceId::new(7), document_id, "doc", None)
            .await
            .is_ok());
    }
    if let Some(resource) = harness
        .repository
        .resources
        .lock()
        .await
        .get_mut(&ResourceId::new(7))
    {
        resource.status = ResourceStatus::Deleting;
    }

    let primary = PrimaryDesignation::secondary();
    let service = harness.service.clone().with_settings(SyncSettings {
        beat_requires_primary: false,
        ..SyncSettings::default()
    });
    assert_eq!(
        service.run_beat(BeatJob::Scan(SyncDomain::Deletion), &primary).await,
        BeatOutcome::Completed(1)
    );
    harness.drain_queue().await;

    assert_eq!(
        service.run_beat(BeatJob::Monitor, &primary).await,
        BeatOutcome::Completed(1)
    );
    assert!(harness.repository.documents.lock().await.is_empty());
    assert_eq!(harness.index.deletes.lock().await.len(), 2);
    assert_eq!(
        *harness.repository.succeeded.lock().await,
        vec![(SyncDomain::Deletion, ResourceId::new(7))]
    );
}

#[tokio::test]
async fn secondary_worker_skips_beats_reserved_to_primary() {
    let harness = Harness::with_items(abc_items()).await;

    let outcome = harness
        .service
        .run_beat(
            BeatJob::Scan(SyncDomain::PermissionSync),
            &PrimaryDesignation::secondary(),
        )
        .await;

    assert_eq!(outcome, BeatOutcome::NotPrimary);
    assert!(harness.queue.queued().await.is_empty());
}

#[tokio::test]
async fn scan_dispatches_only_due_supported_resources() {
    let harness = Harness::with_items(abc_items()).await;
    if let Some(resource) = harness
        .repository
        .resources
        .lock()
        .await
        .get_mut(&ResourceId::new(7))
    {
        resource.last_permission_sync_at = Some(Utc::now());
    }
    harness
        .repository
        .resources
        .lock()
        .await
        .insert(ResourceId::new(9), active_resource(9, ConnectorType::Web));

    let triggered = harness
        .service
        .scan_and_dispatch(SyncDomain::PermissionSync)
        .await;

    assert_eq!(triggered.ok(), Some(1));
    let queued = harness.queue.queued().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].task.resource_id(), ResourceId::new(42));
}

async fn primary_designation(harness: &Harness) -> PrimaryDesignation {
    let mut lock = DistributedLock::new(
        harness.locks.clone(),
        "primary_worker",
        "worker-a",
        Duration::from_secs(120),
    );
    assert!(lock.acquire(None).await.unwrap_or(false));
    PrimaryDesignation::primary(lock)
}

#[tokio::test]
async fn failing_generator_leaves_a_newer_cycle_untouched() {
    let store = Arc::new(FakeCoordinationStore::default());
    let takeover = Arc::new(TakeoverEnumerator {
        fence: ResourceSyncFence::new(
            store.clone(),
            SyncDomain::PermissionSync,
            ResourceId::new(42),
        ),
        newer_task_id: "newer-generator".to_owned(),
    });
    let harness = Harness::over_store(store, |_| {
        EnumeratorRegistry::new().with(
            SyncDomain::PermissionSync,
            ConnectorType::Confluence,
            takeover,
        )
    })
    .await;

    let task_id = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    let outcome = harness
        .service
        .run_generator(SyncDomain::PermissionSync, ResourceId::new(42), &task_id)
        .await;

    assert!(matches!(outcome, Err(AppError::Unavailable(_))));
    let fence = harness.fence(SyncDomain::PermissionSync, 42);
    assert!(fence
        .payload()
        .await
        .ok()
        .flatten()
        .is_some_and(|payload| payload.is_owned_by("newer-generator")));
    assert_eq!(fence.remaining_tasks().await.ok(), Some(1));
    assert!(harness.repository.failed.lock().await.is_empty());

    let redispatched = harness
        .service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await;
    assert!(matches!(redispatched, Ok(None)));
}

#[tokio::test(start_paused = true)]
async fn processing_lock_is_extended_while_enumeration_runs() {
    let harness = Harness::new(|_| {
        EnumeratorRegistry::new().with(
            SyncDomain::PermissionSync,
            ConnectorType::Confluence,
            Arc::new(SlowEnumerator {
                delay: Duration::from_secs(30),
                items: abc_items(),
            }),
        )
    })
    .await;
    let mut settings = SyncSettings::default();
    settings.generator_lock_ttl = Duration::from_secs(3);
    let service = harness.service.clone().with_settings(settings);

    let task_id = service
        .try_dispatch(SyncDomain::PermissionSync, ResourceId::new(42))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    let generator = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .run_generator(SyncDomain::PermissionSync, ResourceId::new(42), &task_id)
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut competing = DistributedLock::new(
        harness.locks.clone(),
        synccoord_domain::SyncKeys::new(SyncDomain::PermissionSync)
            .generator_lock(ResourceId::new(42)),
        "worker-b",
        Duration::from_secs(3),
    );
    assert!(!competing.acquire(None).await.unwrap_or(true));

    let outcome = generator.await.ok().and_then(Result::ok);
    assert_eq!(outcome, Some(GeneratorOutcome::Dispatched(3)));
    assert!(competing.acquire(None).await.unwrap_or(false));
}

#[tokio::test]
async fn overlapping_beat_firing_is_skipped() {
    let harness = Harness::with_items(abc_items()).await;
    let primary = primary_designation(&harness).await;
    let job = BeatJob::Scan(SyncDomain::PermissionSync);

    let mut running = DistributedLock::new(
        harness.locks.clone(),
        job.lock_key(),
        "worker-b",
        Duration::from_secs(300),
    );
    assert!(running.acquire(None).await.unwrap_or(false));

    assert_eq!(
        harness.service.run_beat(job, &primary).await,
        BeatOutcome::Overlapping
    );
    assert!(harness.queue.queued().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn timed_out_scan_releases_its_beat_lock() {
    let harness = Harness::with_items(abc_items()).await;
    let primary = primary_designation(&harness).await;
    let mut settings = SyncSettings::default();
    settings.beat_timeout = Duration::from_secs(1);
    let service = harness.service.clone().with_settings(settings);
    let job = BeatJob::Scan(SyncDomain::PermissionSync);

    *harness.repository.candidate_delay.lock().await = Some(Duration::from_secs(600));
    assert_eq!(service.run_beat(job, &primary).await, BeatOutcome::TimedOut);
    assert!(harness.queue.queued().await.is_empty());

    *harness.repository.candidate_delay.lock().await = None;
    assert_eq!(service.run_beat(job, &primary).await, BeatOutcome::Completed(2));
    assert_eq!(harness.queue.queued().await.len(), 2);
}
