use super::*;

const SELECT_RESOURCE_COLUMNS: &str = r#"
    SELECT
        id,
        connector_type,
        status,
        sync_period_seconds,
        last_indexed_at,
        last_permission_sync_at,
        last_external_group_sync_at,
        last_pruned_at
    FROM connector_credential_pairs
"#;

impl PostgresSyncRepository {
    pub(super) async fn find_resource_impl(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Option<SyncResource>> {
        let row = sqlx::query_as::<_, SyncResourceRow>(
            format!("{SELECT_RESOURCE_COLUMNS} WHERE id = $1").as_str(),
        )
        .bind(resource_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load resource '{resource_id}': {error}"))
        })?;

        row.map(sync_resource_from_row).transpose()
    }

    pub(super) async fn list_sync_candidates_impl(
        &self,
        domain: SyncDomain,
    ) -> AppResult<Vec<SyncResource>> {
        let status = match domain {
            SyncDomain::Deletion => ResourceStatus::Deleting,
            SyncDomain::Indexing
            | SyncDomain::PermissionSync
            | SyncDomain::ExternalGroupSync
            | SyncDomain::Pruning => ResourceStatus::Active,
        };

        let rows = sqlx::query_as::<_, SyncResourceRow>(
            format!("{SELECT_RESOURCE_COLUMNS} WHERE status = $1 ORDER BY id").as_str(),
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list {domain} candidates: {error}"))
        })?;

        rows.into_iter().map(sync_resource_from_row).collect()
    }

    pub(super) async fn mark_sync_succeeded_impl(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        finished_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let statement = match domain {
            SyncDomain::Indexing => {
                "UPDATE connector_credential_pairs SET last_indexed_at = $2, updated_at = now() WHERE id = $1"
            }
            SyncDomain::PermissionSync => {
                "UPDATE connector_credential_pairs SET last_permission_sync_at = $2, updated_at = now() WHERE id = $1"
            }
            SyncDomain::ExternalGroupSync => {
                "UPDATE connector_credential_pairs SET last_external_group_sync_at = $2, updated_at = now() WHERE id = $1"
            }
            SyncDomain::Pruning => {
                "UPDATE connector_credential_pairs SET last_pruned_at = $2, updated_at = now() WHERE id = $1"
            }
            SyncDomain::Deletion => {
                return self.delete_resource(resource_id).await;
            }
        };

        sqlx::query(statement)
            .bind(resource_id.as_i64())
            .bind(finished_at)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to record {domain} success for resource '{resource_id}': {error}"
                ))
            })?;

        sqlx::query(
            r#"
            DELETE FROM connector_sync_failures
            WHERE resource_id = $1 AND domain = $2
            "#,
        )
        .bind(resource_id.as_i64())
        .bind(domain.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to clear {domain} failure for resource '{resource_id}': {error}"
            ))
        })?;

        Ok(())
    }

    pub(super) async fn mark_sync_failed_impl(
        &self,
        domain: SyncDomain,
        resource_id: ResourceId,
        reason: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO connector_sync_failures (resource_id, domain, reason, failed_at)
            SELECT id, $2, $3, now()
            FROM connector_credential_pairs
            WHERE id = $1
            ON CONFLICT (resource_id, domain)
            DO UPDATE SET reason = EXCLUDED.reason, failed_at = EXCLUDED.failed_at
            "#,
        )
        .bind(resource_id.as_i64())
        .bind(domain.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to record {domain} failure for resource '{resource_id}': {error}"
            ))
        })?;

        Ok(())
    }

    /// Removes a resource whose deletion finished; owned rows cascade.
    async fn delete_resource(&self, resource_id: ResourceId) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM connector_credential_pairs
            WHERE id = $1 AND status = 'deleting'
            "#,
        )
        .bind(resource_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete resource '{resource_id}': {error}"
            ))
        })?;

        Ok(())
    }
}
