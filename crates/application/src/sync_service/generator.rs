use tokio::time::Instant;

use super::*;

const MIN_LOCK_RENEWAL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of one generator execution that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorOutcome {
    /// Another execution holds the processing lock; nothing was changed.
    AlreadyRunning,
    /// Items were fanned out and the count was recorded.
    Dispatched(u64),
}

enum GeneratorError {
    /// The fence now belongs to another cycle; its state must not be touched.
    Stale(String),
    Failed(AppError),
}

impl From<AppError> for GeneratorError {
    fn from(error: AppError) -> Self {
        Self::Failed(error)
    }
}

impl SyncCoordinatorService {
    /// Enumerates a resource's items and fans them out as tracked subtasks.
    ///
    /// The processing lock is extended while enumeration runs. Any failure
    /// after the lock is taken clears the tracker, the count marker, and the
    /// fence before the error is returned, unless the fence now belongs to
    /// another cycle; that cycle's state is left as it is.
    pub async fn run_generator(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        task_id: &str,
    ) -> AppResult<GeneratorOutcome> {
        let keys = SyncKeys::new(domain);
        let mut processing_lock = self.lock(
            keys.generator_lock(resource_id),
            self.settings.generator_lock_ttl,
        );

        if !processing_lock.acquire(None).await? {
            info!(
                domain = %domain,
                resource_id = %resource_id,
                task_id = %task_id,
                "generator already running for resource, exiting"
            );
            return Ok(GeneratorOutcome::AlreadyRunning);
        }

        let fence = self.fence(domain, resource_id);
        let generation = self.generate(&fence, task_id);
        tokio::pin!(generation);
        let renew_every = (processing_lock.ttl() / 3).max(MIN_LOCK_RENEWAL_INTERVAL);
        let mut renewal = tokio::time::interval_at(Instant::now() + renew_every, renew_every);
        let generated = loop {
            tokio::select! {
                generated = &mut generation => break generated,
                _ = renewal.tick() => {
                    match processing_lock.reacquire().await {
                        Ok(true) => {}
                        Ok(false) => warn!(
                            domain = %domain,
                            resource_id = %resource_id,
                            task_id = %task_id,
                            "generator processing lock expired while running"
                        ),
                        Err(error) => warn!(
                            domain = %domain,
                            resource_id = %resource_id,
                            error = %error,
                            "failed to extend generator processing lock"
                        ),
                    }
                }
            }
        };

        let result = match generated {
            Ok(dispatched) => {
                info!(
                    domain = %domain,
                    resource_id = %resource_id,
                    task_id = %task_id,
                    dispatched,
                    "generator finished fan-out"
                );
                Ok(GeneratorOutcome::Dispatched(dispatched))
            }
            Err(GeneratorError::Stale(message)) => {
                warn!(
                    domain = %domain,
                    resource_id = %resource_id,
                    task_id = %task_id,
                    "{message}"
                );
                Err(AppError::Conflict(message))
            }
            Err(GeneratorError::Failed(error)) => {
                self.roll_back(&fence, task_id, &error).await;
                Err(error)
            }
        };

        processing_lock.release().await;
        result
    }

    async fn generate(
        &self,
        fence: &ResourceSyncFence,
        task_id: &str,
    ) -> Result<u64, GeneratorError> {
        let domain = fence.domain();
        let resource_id = fence.resource_id();

        let resource = self
            .repository
            .find_resource(resource_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}' does not exist")))?;
        let enumerator = self.enumerators.resolve(domain, resource.connector_type)?;

        let payload = fence.payload().await?.ok_or_else(|| {
            AppError::Internal(format!(
                "{domain} fence of resource '{resource_id}' is missing at generator start"
            ))
        })?;
        if !payload.is_owned_by(task_id) {
            return Err(GeneratorError::Stale(format!(
                "{domain} fence of resource '{resource_id}' belongs to generator '{}'",
                payload.task_id
            )));
        }

        let index_attempt_id = payload.index_attempt_id;
        fence.set_fence(&payload.with_started(Utc::now())).await?;
        if let Some(attempt_id) = index_attempt_id {
            self.repository
                .update_index_attempt(attempt_id, IndexAttemptStatus::InProgress, None)
                .await?;
        }

        let items = enumerator.enumerate(&resource).await?;
        debug!(
            domain = %domain,
            resource_id = %resource_id,
            items = items.len(),
            "enumerated work items"
        );

        let mut dispatched: u64 = 0;
        for item in items {
            self.ensure_current_cycle(fence, task_id).await?;

            let item_token = SyncTask::new_item_token();
            fence.add_task(item_token.as_str()).await?;
            self.queue
                .send(TaskEnvelope::new(
                    item_token,
                    QueueLane::SyncItems,
                    TaskPriority::Medium,
                    SyncTask::ProcessItem {
                        domain,
                        resource_id,
                        generator_task_id: task_id.to_owned(),
                        item,
                    },
                ))
                .await?;
            dispatched += 1;
        }

        self.ensure_current_cycle(fence, task_id).await?;
        fence.set_generator_complete(dispatched).await?;
        Ok(dispatched)
    }

    async fn ensure_current_cycle(
        &self,
        fence: &ResourceSyncFence,
        task_id: &str,
    ) -> Result<(), GeneratorError> {
        match fence.payload().await? {
            Some(payload) if payload.is_owned_by(task_id) => Ok(()),
            Some(payload) => Err(GeneratorError::Stale(format!(
                "{} fence of resource '{}' was taken over by generator '{}'",
                fence.domain(),
                fence.resource_id(),
                payload.task_id
            ))),
            None => Err(GeneratorError::Stale(format!(
                "{} fence of resource '{}' was cleared while the generator ran",
                fence.domain(),
                fence.resource_id()
            ))),
        }
    }

    async fn roll_back(&self, fence: &ResourceSyncFence, task_id: &str, cause: &AppError) {
        let domain = fence.domain();
        let resource_id = fence.resource_id();
        let reason = format!("generator failed: {cause}");

        let index_attempt_id = match fence.payload().await {
            Ok(Some(payload)) if payload.is_owned_by(task_id) => payload.index_attempt_id,
            Ok(other) => {
                warn!(
                    domain = %domain,
                    resource_id = %resource_id,
                    task_id = %task_id,
                    owner = ?other.map(|payload| payload.task_id),
                    error = %cause,
                    "generator failed after losing its fence, nothing rolled back"
                );
                return;
            }
            Err(error) => {
                warn!(
                    domain = %domain,
                    resource_id = %resource_id,
                    task_id = %task_id,
                    error = %error,
                    "failed to read fence during rollback, leaving it to the monitor"
                );
                return;
            }
        };

        match fence.reset().await {
            Ok(()) => warn!(
                domain = %domain,
                resource_id = %resource_id,
                task_id = %task_id,
                error = %cause,
                "generator failed, fence rolled back"
            ),
            Err(error) => error!(
                domain = %domain,
                resource_id = %resource_id,
                task_id = %task_id,
                error = %error,
                "failed to roll back fence after generator failure"
            ),
        }

        self.finish_index_attempt(
            index_attempt_id,
            IndexAttemptStatus::Failed,
            Some(reason.as_str()),
        )
        .await;

        if let Err(error) = self
            .repository
            .mark_sync_failed(domain, resource_id, reason.as_str())
            .await
        {
            error!(
                domain = %domain,
                resource_id = %resource_id,
                error = %error,
                "failed to record sync failure"
            );
        }
    }
}
