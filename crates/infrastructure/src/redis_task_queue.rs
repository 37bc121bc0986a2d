//! Redis list-backed task queue with lanes and priorities.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use synccoord_application::{TaskDelivery, TaskHandle, TaskQueue};
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{QueueLane, TaskEnvelope, TaskPriority};
use tokio::time::Instant;
use tracing::{info, warn};

// KEYS[1] is the consumer's in-flight list, the rest are lane lists in pop order.
const CLAIM_TASK_SCRIPT: &str = r#"
for index = 2, #KEYS do
    local payload = redis.call("RPOP", KEYS[index])
    if payload then
        redis.call("LPUSH", KEYS[1], payload)
        return payload
    end
end
return false
"#;

const MOVE_IN_FLIGHT_SCRIPT: &str = r#"
if redis.call("LREM", KEYS[1], 1, ARGV[1]) > 0 then
    redis.call("RPUSH", KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Redis implementation of the task queue port.
///
/// Each lane and priority pair is one list. Producers push on the left and
/// consumers claim from the right, so each list is FIFO. A claimed payload is
/// moved atomically into the consumer's in-flight list and stays there until
/// it is acknowledged.
#[derive(Clone)]
pub struct RedisTaskQueue {
    client: redis::Client,
    key_prefix: String,
}

impl RedisTaskQueue {
    /// Creates one queue adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }

    async fn claim(
        &self,
        connection: &mut MultiplexedConnection,
        in_flight: &str,
        lanes: &[QueueLane],
    ) -> AppResult<Option<String>> {
        let script = Script::new(CLAIM_TASK_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation.key(in_flight);
        for key in receive_keys(self.key_prefix.as_str(), lanes) {
            invocation.key(key);
        }
        invocation
            .invoke_async::<Option<String>>(connection)
            .await
            .map_err(|error| AppError::Internal(format!("failed to receive task: {error}")))
    }

    /// Moves one payload out of an in-flight list, checking it is still there.
    async fn move_in_flight(
        &self,
        connection: &mut MultiplexedConnection,
        in_flight: &str,
        destination: &str,
        payload: &str,
    ) -> AppResult<bool> {
        Script::new(MOVE_IN_FLIGHT_SCRIPT)
            .key(in_flight)
            .key(destination)
            .arg(payload)
            .invoke_async::<i32>(connection)
            .await
            .map(|moved| moved > 0)
            .map_err(|error| {
                AppError::Internal(format!("failed to move in-flight task: {error}"))
            })
    }
}

fn list_key(key_prefix: &str, lane: QueueLane, priority: TaskPriority) -> String {
    format!("{key_prefix}:queue:{}:{}", lane.as_str(), priority.as_str())
}

fn in_flight_key(key_prefix: &str, consumer: &str) -> String {
    format!("{key_prefix}:queue:in_flight:{consumer}")
}

fn dead_letter_key(key_prefix: &str) -> String {
    format!("{key_prefix}:queue:dead_letter")
}

/// Keys in pop order: every lane's high list before any medium list.
fn receive_keys(key_prefix: &str, lanes: &[QueueLane]) -> Vec<String> {
    TaskPriority::ORDERED
        .into_iter()
        .flat_map(|priority| lanes.iter().map(move |lane| (*lane, priority)))
        .map(|(lane, priority)| list_key(key_prefix, lane, priority))
        .collect()
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn send(&self, envelope: TaskEnvelope) -> AppResult<TaskHandle> {
        let payload = serde_json::to_string(&envelope).map_err(|error| {
            AppError::Internal(format!(
                "failed to serialize task '{}': {error}",
                envelope.task_id
            ))
        })?;

        let mut connection = self.connection().await?;
        connection
            .lpush::<_, _, ()>(
                list_key(self.key_prefix.as_str(), envelope.lane, envelope.priority),
                payload,
            )
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to enqueue task '{}' on lane '{}': {error}",
                    envelope.task_id, envelope.lane
                ))
            })?;

        Ok(TaskHandle {
            task_id: envelope.task_id,
            lane: envelope.lane,
        })
    }

    async fn receive(
        &self,
        consumer: &str,
        lanes: &[QueueLane],
        timeout: Duration,
    ) -> AppResult<Option<TaskDelivery>> {
        if lanes.is_empty() {
            return Err(AppError::Validation(
                "receive requires at least one queue lane".to_owned(),
            ));
        }

        let deadline = Instant::now() + timeout;
        let in_flight = in_flight_key(self.key_prefix.as_str(), consumer);
        let dead_letter = dead_letter_key(self.key_prefix.as_str());
        let mut connection = self.connection().await?;

        loop {
            if let Some(payload) = self.claim(&mut connection, in_flight.as_str(), lanes).await? {
                match serde_json::from_str::<TaskEnvelope>(payload.as_str()) {
                    Ok(envelope) => {
                        return Ok(Some(TaskDelivery {
                            envelope,
                            receipt: payload,
                        }));
                    }
                    Err(error) => {
                        warn!(
                            consumer,
                            error = %error,
                            "moving undecodable task payload to the dead-letter list"
                        );
                        self.move_in_flight(
                            &mut connection,
                            in_flight.as_str(),
                            dead_letter.as_str(),
                            payload.as_str(),
                        )
                        .await?;
                        continue;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RECEIVE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn acknowledge(&self, consumer: &str, delivery: &TaskDelivery) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .lrem::<_, _, ()>(
                in_flight_key(self.key_prefix.as_str(), consumer),
                1,
                delivery.receipt.as_str(),
            )
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to acknowledge task '{}': {error}",
                    delivery.envelope.task_id
                ))
            })
    }

    async fn requeue_unacknowledged(&self, consumer: &str) -> AppResult<usize> {
        let in_flight = in_flight_key(self.key_prefix.as_str(), consumer);
        let mut connection = self.connection().await?;
        let payloads: Vec<String> = connection
            .lrange(in_flight.as_str(), 0, -1)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read in-flight tasks: {error}"))
            })?;

        let mut requeued = 0;
        // Newest first, so after RPUSH the oldest delivery sits at the pop end.
        for payload in payloads {
            let destination = match serde_json::from_str::<TaskEnvelope>(payload.as_str()) {
                Ok(envelope) => list_key(self.key_prefix.as_str(), envelope.lane, envelope.priority),
                Err(_) => dead_letter_key(self.key_prefix.as_str()),
            };
            if self
                .move_in_flight(
                    &mut connection,
                    in_flight.as_str(),
                    destination.as_str(),
                    payload.as_str(),
                )
                .await?
            {
                requeued += 1;
            }
        }

        if requeued > 0 {
            info!(consumer, requeued, "requeued unacknowledged tasks");
        }
        Ok(requeued)
    }
}
