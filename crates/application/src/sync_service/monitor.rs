use super::*;

/// What one monitor check concluded about a fenced resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence disappeared before it could be inspected.
    Vanished,
    /// The generator has not recorded its count yet.
    Generating,
    /// Subtasks are still in flight.
    Draining(u64),
    /// Every item finished; the cycle was recorded as successful.
    Succeeded,
    /// The fence outlived its timeout; the cycle was recorded as failed.
    TimedOut,
}

impl SyncCoordinatorService {
    /// Checks every fenced resource of every domain once.
    ///
    /// Returns how many cycles were finalized. A failing resource is logged
    /// and does not stop the sweep.
    pub async fn monitor_fences(&self) -> AppResult<usize> {
        let mut finalized = 0;

        for domain in SyncDomain::ALL {
            let keys = SyncKeys::new(domain);
            for key in self.store.keys_matching(keys.fence_pattern().as_str()).await? {
                let Some(resource_id) = keys.parse_fence_key(key.as_str()) else {
                    warn!(domain = %domain, key = %key, "ignoring unparsable fence key");
                    continue;
                };

                match self.check_fence(domain, resource_id).await {
                    Ok(FenceStatus::Succeeded | FenceStatus::TimedOut) => finalized += 1,
                    Ok(_) => {}
                    Err(error) => error!(
                        domain = %domain,
                        resource_id = %resource_id,
                        error = %error,
                        "failed to check fence"
                    ),
                }
            }
        }

        Ok(finalized)
    }

    /// Inspects one fence and finalizes the cycle when it drained or timed out.
    pub async fn check_fence(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
    ) -> AppResult<FenceStatus> {
        let fence = self.fence(domain, resource_id);
        let Some(payload) = fence.payload().await? else {
            return Ok(FenceStatus::Vanished);
        };

        // The count is written after the last token, so it is read first.
        let dispatched = fence.generator_complete().await?;
        let remaining = fence.remaining_tasks().await?;

        if let (Some(count), 0) = (dispatched, remaining) {
            self.finish_succeeded(&fence, &payload, count).await?;
            return Ok(FenceStatus::Succeeded);
        }

        let now = Utc::now();
        if payload.is_timed_out(now, self.settings.fence_timeout(domain)) {
            self.finish_timed_out(&fence, &payload, remaining).await;
            return Ok(FenceStatus::TimedOut);
        }

        Ok(match dispatched {
            None => FenceStatus::Generating,
            Some(_) => FenceStatus::Draining(remaining),
        })
    }

    async fn finish_succeeded(
        &self,
        fence: &ResourceSyncFence,
        payload: &FencePayload,
        dispatched: u64,
    ) -> AppResult<()> {
        let domain = fence.domain();
        let resource_id = fence.resource_id();

        self.repository
            .mark_sync_succeeded(domain, resource_id, Utc::now())
            .await?;
        fence.reset().await?;
        self.finish_index_attempt(
            payload.index_attempt_id,
            IndexAttemptStatus::Succeeded,
            None,
        )
        .await;

        info!(
            domain = %domain,
            resource_id = %resource_id,
            task_id = %payload.task_id,
            dispatched,
            "sync cycle succeeded"
        );
        Ok(())
    }

    async fn finish_timed_out(
        &self,
        fence: &ResourceSyncFence,
        payload: &FencePayload,
        remaining: u64,
    ) {
        let domain = fence.domain();
        let resource_id = fence.resource_id();
        let reason = format!(
            "sync cycle timed out after {} minutes with {remaining} items outstanding",
            self.settings.fence_timeout(domain).num_minutes()
        );

        warn!(
            domain = %domain,
            resource_id = %resource_id,
            task_id = %payload.task_id,
            remaining,
            "sync cycle timed out"
        );

        if let Err(error) = fence.reset().await {
            error!(
                domain = %domain,
                resource_id = %resource_id,
                error = %error,
                "failed to clear timed out fence"
            );
        }

        self.finish_index_attempt(
            payload.index_attempt_id,
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
