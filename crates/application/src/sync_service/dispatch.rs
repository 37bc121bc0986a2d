use super::*;

impl SyncCoordinatorService {
    /// Attempts to start one sync cycle for a resource.
    ///
    /// Returns the generator task id when a generator was enqueued, `None`
    /// when the dispatch lock was busy or a blocking fence is set.
    pub async fn try_dispatch(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
    ) -> AppResult<Option<String>> {
        let ttl = self.settings.dispatch_lock_ttl;
        let mut dispatch_lock = self.lock(SyncKeys::dispatch_lock(resource_id), ttl);

        if !dispatch_lock.acquire(Some(ttl / 2)).await? {
            debug!(
                domain = %domain,
                resource_id = %resource_id,
                "dispatch lock busy, skipping resource"
            );
            return Ok(None);
        }

        let result = self.dispatch_locked(domain, resource_id).await;
        dispatch_lock.release().await;
        result
    }

    async fn dispatch_locked(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
    ) -> AppResult<Option<String>> {
        for blocking_domain in domain.blocking_domains() {
            if self.fence(*blocking_domain, resource_id).fenced().await? {
                debug!(
                    domain = %domain,
                    resource_id = %resource_id,
                    blocked_by = %blocking_domain,
                    "resource is fenced, skipping dispatch"
                );
                return Ok(None);
            }
        }

        let fence = self.fence(domain, resource_id);
        fence.reset_tracking().await?;

        let task_id = SyncTask::new_generator_task_id(domain, resource_id);
        let index_attempt_id = if domain.tracks_index_attempts() {
            Some(self.repository.create_index_attempt(resource_id).await?)
        } else {
            None
        };

        let payload = FencePayload::submitted(task_id.clone(), Utc::now())
            .with_index_attempt(index_attempt_id);
        if let Err(error) = fence.set_fence(&payload).await {
            self.finish_index_attempt(
                index_attempt_id,
                IndexAttemptStatus::Failed,
                Some("failed to fence resource"),
            )
            .await;
            return Err(error);
        }

        // The fence must exist before the generator can possibly run.
        let envelope = TaskEnvelope::new(
            task_id.clone(),
            QueueLane::SyncGenerator,
            domain.generator_priority(),
            SyncTask::Generate {
                domain,
                resource_id,
            },
        );
        if let Err(error) = self.queue.send(envelope).await {
            if let Err(clear_error) = fence.clear_fence().await {
                error!(
                    domain = %domain,
                    resource_id = %resource_id,
                    error = %clear_error,
                    "failed to clear fence after enqueue failure"
                );
            }
            self.finish_index_attempt(
                index_attempt_id,
                IndexAttemptStatus::Failed,
                Some("failed to enqueue generator"),
            )
            .await;
            return Err(error);
        }

        info!(
            domain = %domain,
            resource_id = %resource_id,
            task_id = %task_id,
            "dispatched sync generator"
        );
        Ok(Some(task_id))
    }
}
