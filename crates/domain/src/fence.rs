use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Payload stored in a fence record while a generator owns a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FencePayload {
    /// When the dispatcher set the fence.
    pub submitted: DateTime<Utc>,
    /// When the generator started executing, if it has.
    pub started: Option<DateTime<Utc>>,
    /// Queue task id of the generator that owns this fence.
    pub task_id: String,
    /// Index attempt tracked by an indexing fence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_attempt_id: Option<i64>,
}

impl FencePayload {
    /// Creates the payload written at dispatch time, before the generator runs.
    #[must_use]
    pub fn submitted(task_id: impl Into<String>, submitted: DateTime<Utc>) -> Self {
        Self {
            submitted,
            started: None,
            task_id: task_id.into(),
            index_attempt_id: None,
        }
    }

    /// Returns a copy tracking one index attempt.
    #[must_use]
    pub fn with_index_attempt(mut self, index_attempt_id: Option<i64>) -> Self {
        self.index_attempt_id = index_attempt_id;
        self
    }

    /// Returns a copy marked as started.
    #[must_use]
    pub fn with_started(mut self, started: DateTime<Utc>) -> Self {
        self.started = Some(started);
        self
    }

    /// Returns whether the fence is owned by the given generator task.
    #[must_use]
    pub fn is_owned_by(&self, task_id: &str) -> bool {
        self.task_id == task_id
    }

    /// Returns whether the fence outlived the timeout.
    ///
    /// Fences whose generator never started are measured from submission.
    #[must_use]
    pub fn is_timed_out(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let reference = self.started.unwrap_or(self.submitted);
        now.signed_duration_since(reference) > timeout
    }
}
