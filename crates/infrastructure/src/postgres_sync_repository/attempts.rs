use super::*;

impl PostgresSyncRepository {
    pub(super) async fn create_index_attempt_impl(&self, resource_id: ResourceId) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO index_attempts (resource_id, status, created_at, updated_at)
            VALUES ($1, 'not_started', now(), now())
            RETURNING id
            "#,
        )
        .bind(resource_id.as_i64())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to create index attempt for resource '{resource_id}': {error}"
            ))
        })
    }

    pub(super) async fn update_index_attempt_impl(
        &self,
        attempt_id: i64,
        status: IndexAttemptStatus,
        reason: Option<&str>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE index_attempts
            SET status = $2,
                error_message = COALESCE($3, error_message),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .bind(status.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update index attempt '{attempt_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "index attempt '{attempt_id}' does not exist"
            )));
        }

        Ok(())
    }

    pub(super) async fn list_in_progress_index_attempts_impl(&self) -> AppResult<Vec<IndexAttempt>> {
        let rows = sqlx::query_as::<_, IndexAttemptRow>(
            r#"
            SELECT id, resource_id, status, created_at
            FROM index_attempts
            WHERE status IN ('not_started', 'in_progress')
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list in-progress index attempts: {error}"))
        })?;

        rows.into_iter().map(index_attempt_from_row).collect()
    }
}
