use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use synccoord_application::{IndexAttempt, IndexAttemptStatus, SyncRepository};
use synccoord_core::{AppError, AppResult};
use synccoord_domain::{
    ConnectorType, DocumentAccess, ResourceId, ResourceStatus, SyncDomain, SyncResource,
};

mod attempts;
mod documents;
mod resources;


/// PostgreSQL-backed persistence for resources, index attempts, and documents.
#[derive(Clone)]
pub struct PostgresSyncRepository {
    pool: PgPool,
}

impl PostgresSyncRepository {
    /// Creates a sync repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncResourceRow {
    id: i64,
    connector_type: String,
    status: String,
    sync_period_seconds: Option<i32>,
    last_indexed_at: Option<DateTime<Utc>>,
    last_permission_sync_at: Option<DateTime<Utc>>,
    last_external_group_sync_at: Option<DateTime<Utc>>,
    last_pruned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct IndexAttemptRow {
    id: i64,
    resource_id: i64,
    status: String,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl SyncRepository for PostgresSyncRepository {
    async fn find_resource(&self, resource_id: ResourceId) -> AppResult<Option<SyncResource>> {
        self.find_resource_impl(resource_id).await
    }

    async fn list_sync_candidates(&self, domain: SyncDomain) -> AppResult<Vec<SyncResource>> {
        self.list_sync_candidates_impl(domain).await
    }

    async fn mark_sync_succeeded(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        finished_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.mark_sync_succeeded_impl(domain, resource_id, finished_at)
            .await
    }

    async fn mark_sync_failed(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        reason: &str,
    ) -> AppResult<()> {
        self.mark_sync_failed_impl(domain, resource_id, reason).await
    }

    async fn create_index_attempt(&self, resource_id: ResourceId) -> AppResult<i64> {
        self.create_index_attempt_impl(resource_id).await
    }

    async fn update_index_attempt(
        &self,
        attempt_id: i64,
        status: IndexAttemptStatus,
        reason: Option<&str>,
    ) -> AppResult<()> {
        self.update_index_attempt_impl(attempt_id, status, reason)
            .await
    }

    async fn list_in_progress_index_attempts(&self) -> AppResult<Vec<IndexAttempt>> {
        self.list_in_progress_index_attempts_impl().await
    }

    async fn list_document_ids(&self, resource_id: ResourceId) -> AppResult<Vec<String>> {
        self.list_document_ids_impl(resource_id).await
    }

    async fn upsert_document(
        &self,
        resource_id: ResourceId,
        document_id: &str,
        title: &str,
        source_url: Option<&str>,
    ) -> AppResult<()> {
        self.upsert_document_impl(resource_id, document_id, title, source_url)
            .await
    }

    async fn upsert_document_access(
        &self,
        resource_id: ResourceId,
        document_id: &str,
        access: &DocumentAccess,
    ) -> AppResult<()> {
        self.upsert_document_access_impl(resource_id, document_id, access)
            .await
    }

    async fn upsert_external_group(
        &self,
        resource_id: ResourceId,
        group_id: &str,
        user_emails: &[String],
    ) -> AppResult<()> {
        self.upsert_external_group_impl(resource_id, group_id, user_emails)
            .await
    }

    async fn delete_document(&self, resource_id: ResourceId, document_id: &str) -> AppResult<()> {
        self.delete_document_impl(resource_id, document_id).await
    }
}

fn sync_resource_from_row(row: SyncResourceRow) -> AppResult<SyncResource> {
    let sync_period_seconds = row
        .sync_period_seconds
        .map(|seconds| {
            u32::try_from(seconds).map_err(|error| {
                AppError::Internal(format!(
                    "resource '{}' has invalid sync period {seconds}: {error}",
                    row.id
                ))
            })
        })
        .transpose()?;

    Ok(SyncResource {
        id: ResourceId::new(row.id),
        connector_type: ConnectorType::parse(row.connector_type.as_str())?,
        status: ResourceStatus::parse(row.status.as_str())?,
        sync_period_seconds,
        last_indexed_at: row.last_indexed_at,
        last_permission_sync_at: row.last_permission_sync_at,
        last_external_group_sync_at: row.last_external_group_sync_at,
        last_pruned_at: row.last_pruned_at,
    })
}

fn index_attempt_from_row(row: IndexAttemptRow) -> AppResult<IndexAttempt> {
    Ok(IndexAttempt {
        id: row.id,
        resource_id: ResourceId::new(row.resource_id),
        status: IndexAttemptStatus::parse(row.status.as_str())?,
        created_at: row.created_at,
    })
}
