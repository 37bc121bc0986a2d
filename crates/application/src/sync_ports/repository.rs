use async_trait::async_trait;
use chrono::{DateTime, Utc};
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{DocumentAccess, ResourceId, SyncDomain, SyncResource};

/// Status of one index attempt row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAttemptStatus {
    /// Created by dispatch, generator not started yet.
    NotStarted,
    /// Generator is running or items are draining.
    InProgress,
    /// Every item finished.
    Succeeded,
    /// Generator failed or the fence timed out.
    Failed,
    /// Canceled, e.g. orphaned by a crashed worker.
    Canceled,
}

impl IndexAttemptStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Succeeded => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(AppError::Validation(format!(
                "unknown index attempt status '{value}'"
            ))),
        }
    }

    /// Returns whether the attempt has not reached a terminal status.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::NotStarted | Self::InProgress)
    }
}

/// Persisted index attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAttempt {
    /// Attempt identifier.
    pub id: i64,
    /// Resource being indexed.
    pub resource_id: ResourceId,
    /// Current status.
    pub status: IndexAttemptStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Relational persistence used by the coordinator.
///
/// Every write commits on its own so one failure never rolls back others.
#[async_trait]
pub trait SyncRepository: Send + Sync {
    /// Returns one resource.
    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<SyncResource>>;

    /// Lists resources that may be due for the domain.
    async fn list_sync_candidates(&self, domain: SyncDomain) -> AppResult<Vec<SyncResource>>;

    /// Records a successful cycle.
    async fn mark_sync_succeeded(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        finished_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Records a failed cycle for operator visibility.
    async fn mark_sync_failed(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        reason: &str,
    ) -> AppResult<()>;

    /// Creates an index attempt in `not_started`.
    async fn create_index_attempt(&self, resource_id: ResourceId) -> AppResult<i64>;

    /// Moves an index attempt to a new status.
    async fn update_index_attempt(
        &self,
        attempt_id: i64,
        status: IndexAttemptStatus,
        reason: Option<&str>,
    ) -> AppResult<()>;

    /// Lists index attempts in `not_started` or `in_progress`.
    async fn list_in_progress_index_attempts(&self) -> AppResult<Vec<IndexAttempt>>;

    /// Lists document ids owned by one resource.
    async fn list_document_ids(&self, resource_id: ResourceId) -> AppResult<Vec<String>>;

    /// Upserts one fetched document row.
    async fn upsert_document(
        &self,
        resource_id: ResourceId,
        document_id: &str,
        title: &str,
        source_url: Option<&str>,
    ) -> AppResult<()>;

    /// Replaces the stored access control of one document.
    async fn upsert_document_access(
        &self,
        resource_id: ResourceId,
        document_id: &str,
        access: &DocumentAccess,
    ) -> AppResult<()>;

    /// Replaces one external group's membership.
    async fn upsert_external_group(
        &self,
        resource_id: ResourceId,
        group_id: &str,
        user_emails: &[String],
    ) -> AppResult<()>;

    /// Deletes one document row.
    async fn delete_document(&self, resource_id: ResourceId, document_id: &str) -> AppResult<()>;
}
