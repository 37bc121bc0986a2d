use super::*;

impl PostgresSyncRepository {
    pub(super) async fn list_document_ids_impl(
        &self,
        resource_id: ResourceId,
    ) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT document_id
            FROM documents
            WHERE resource_id = $1
            ORDER BY document_id
            "#,
        )
        .bind(resource_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list documents for resource '{resource_id}': {error}"
            ))
        })
    }

    pub(super) async fn upsert_document_impl(
        &self,
        resource_id: ResourceId,
        document_id: &str,
        title: &str,
        source_url: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (resource_id, document_id, title, source_url, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (resource_id, document_id)
            DO UPDATE SET
                title = EXCLUDED.title,
                source_url = EXCLUDED.source_url,
                updated_at = now()
            "#,
        )
        .bind(resource_id.as_i64())
        .bind(document_id)
        .bind(title)
        .bind(source_url)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to upsert document '{document_id}' for resource '{resource_id}': {error}"
            ))
        })?;

        Ok(())
    }

    pub(super) async fn upsert_document_access_impl(
        &self,
        resource_id: ResourceId,
        document_id: &str,
        access: &DocumentAccess,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                resource_id,
                document_id,
                external_user_emails,
                external_user_group_ids,
                is_public,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (resource_id, document_id)
            DO UPDATE SET
                external_user_emails = EXCLUDED.external_user_emails,
                external_user_group_ids = EXCLUDED.external_user_group_ids,
                is_public = EXCLUDED.is_public,
                updated_at = now()
            "#,
        )
        .bind(resource_id.as_i64())
        .bind(document_id)
        .bind(access.external_user_emails.as_slice())
        .bind(access.external_user_group_ids.as_slice())
        .bind(access.is_public)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update access of document '{document_id}' for resource '{resource_id}': {error}"
            ))
        })?;

        Ok(())
    }

    pub(super) async fn upsert_external_group_impl(
        &self,
        resource_id: ResourceId,
        group_id: &str,
        user_emails: &[String],
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO external_user_groups (resource_id, group_id, user_emails, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (resource_id, group_id)
            DO UPDATE SET user_emails = EXCLUDED.user_emails, updated_at = now()
            "#,
        )
        .bind(resource_id.as_i64())
        .bind(group_id)
        .bind(user_emails)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to upsert external group '{group_id}' for resource '{resource_id}': {error}"
            ))
        })?;

        Ok(())
    }

    pub(super) async fn delete_document_impl(
        &self,
        resource_id: ResourceId,
        document_id: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM documents
            WHERE resource_id = $1 AND document_id = $2
            "#,
        )
        .bind(resource_id.as_i64())
        .bind(document_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete document '{document_id}' for resource '{resource_id}': {error}"
            ))
        })?;

        Ok(())
    }
}
