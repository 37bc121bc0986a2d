use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use synccoord_core::{AppError, AppResult};

use crate::{ResourceId, SyncDomain, SyncWorkItem};

/// Queue priority within one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Consumed first.
    High,
    /// Default priority.
    Medium,
    /// Consumed when nothing else is waiting.
    Low,
}

impl TaskPriority {
    /// Priorities in consumption order.
    pub const ORDERED: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    /// Returns stable key value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Named queue lane consumed by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueLane {
    /// Heavy enumeration work.
    SyncGenerator,
    /// Quick per-item subtasks.
    SyncItems,
}

impl QueueLane {
    /// Every lane.
    pub const ALL: [Self; 2] = [Self::SyncGenerator, Self::SyncItems];

    /// Returns stable key value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncGenerator => "sync_generator",
            Self::SyncItems => "sync_items",
        }
    }

    /// Parses key value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim() {
            "sync_generator" => Ok(Self::SyncGenerator),
            "sync_items" => Ok(Self::SyncItems),
            other => Err(AppError::Validation(format!("unknown queue lane '{other}'"))),
        }
    }
}

impl Display for QueueLane {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Task body carried through the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum SyncTask {
    /// Enumerate and fan out one resource's work items.
    Generate {
        /// Domain of the fence that guards this generator.
        domain: SyncDomain,
        /// Resource to enumerate.
        resource_id: ResourceId,
    },
    /// Process exactly one work item.
    ProcessItem {
        /// Domain whose tracker holds the item token.
        domain: SyncDomain,
        /// Resource the item belongs to.
        resource_id: ResourceId,
        /// Task id of the generator that emitted the item.
        generator_task_id: String,
        /// Item payload.
        item: SyncWorkItem,
    },
}

impl SyncTask {
    /// Returns stable task name used in logs.
    #[must_use]
    pub fn task_name(&self) -> &'static str {
        match self {
            Self::Generate { .. } => "sync_generator",
            Self::ProcessItem { .. } => "sync_item",
        }
    }

    /// Returns the domain of the task.
    #[must_use]
    pub fn domain(&self) -> SyncDomain {
        match self {
            Self::Generate { domain, .. } | Self::ProcessItem { domain, .. } => *domain,
        }
    }

    /// Returns the resource of the task.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Self::Generate { resource_id, .. } | Self::ProcessItem { resource_id, .. } => {
                *resource_id
            }
        }
    }

    /// Builds a fresh, globally unique generator task id.
    ///
    /// The resource-scoped prefix keeps ids readable in queue tooling.
    #[must_use]
    pub fn new_generator_task_id(domain: SyncDomain, resource_id: ResourceId) -> String {
        format!("{domain}_generator_{resource_id}_{}", uuid::Uuid::new_v4())
    }

    /// Builds a fresh item token.
    #[must_use]
    pub fn new_item_token() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// One queued message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Queue task id; item tokens double as subtask ids.
    pub task_id: String,
    /// Lane the task was sent to.
    pub lane: QueueLane,
    /// Priority within the lane.
    pub priority: TaskPriority,
    /// Enqueue timestamp.
    pub enqueued_at: DateTime<Utc>,
    /// Task body.
    pub task: SyncTask,
}

impl TaskEnvelope {
    /// Creates an envelope stamped with the current time.
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        lane: QueueLane,
        priority: TaskPriority,
        task: SyncTask,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            lane,
            priority,
            enqueued_at: Utc::now(),
            task,
        }
    }
}
