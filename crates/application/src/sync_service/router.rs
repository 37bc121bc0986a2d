use super::*;

/// Executes queued sync tasks on a consumer worker.
#[derive(Clone)]
pub struct SyncTaskRouter {
    service: SyncCoordinatorService,
}

impl SyncTaskRouter {
    /// Creates a router over the coordinator.
    #[must_use]
    pub fn new(service: SyncCoordinatorService) -> Self {
        Self { service }
    }

    /// Runs one received task.
    ///
    /// Generator errors are returned so the consumer can log them; item
    /// failures are contained by the subtask itself.
    pub async fn execute(&self, envelope: &TaskEnvelope) -> AppResult<()> {
        debug!(
            task = envelope.task.task_name(),
            task_id = %envelope.task_id,
            lane = %envelope.lane,
            "executing task"
        );

        match &envelope.task {
            SyncTask::Generate {
                domain,
                resource_id,
            } => self
                .service
                .run_generator(*domain, *resource_id, envelope.task_id.as_str())
                .await
                .map(|_| ()),
            SyncTask::ProcessItem {
                domain,
                resource_id,
                generator_task_id,
                item,
            } => {
                let succeeded = self
                    .service
                    .process_item(*domain, *resource_id, envelope.task_id.as_str(), item)
                    .await;
                debug!(
                    task_id = %envelope.task_id,
                    generator_task_id = %generator_task_id,
                    succeeded,
                    "work item processed"
                );
                Ok(())
            }
        }
    }
}
