use std::time::Duration;

use async_trait::async_trait;
use synccoord_core::AppResult;
use synccoord_domain::{QueueLane, TaskEnvelope};

/// Handle returned for one sent task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    /// Queue task id.
    pub task_id: String,
    /// Lane the task was sent to.
    pub lane: QueueLane,
}

/// One received task and the receipt that acknowledges it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDelivery {
    /// Decoded task.
    pub envelope: TaskEnvelope,
    /// Opaque backend receipt passed back to `acknowledge`.
    pub receipt: String,
}

/// Task queue port with at-least-once delivery.
///
/// A received task stays in the consumer's in-flight list until it is
/// acknowledged. Tasks left there by a consumer that died are put back on
/// their lane by `requeue_unacknowledged`.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Sends one task.
    async fn send(&self, envelope: TaskEnvelope) -> AppResult<TaskHandle>;

    /// Waits up to `timeout` for the highest-priority task on any of the lanes
    /// and moves it to the consumer's in-flight list.
    async fn receive(
        &self,
        consumer: &str,
        lanes: &[QueueLane],
        timeout: Duration,
    ) -> AppResult<Option<TaskDelivery>>;

    /// Drops a finished task from the consumer's in-flight list.
    async fn acknowledge(&self, consumer: &str, delivery: &TaskDelivery) -> AppResult<()>;

    /// Returns every unacknowledged task of the consumer to its lane and
    /// reports how many were moved.
    async fn requeue_unacknowledged(&self, consumer: &str) -> AppResult<usize>;
}
