//! Startup reachability probes for the worker's dependencies.

use async_trait::async_trait;
use sqlx::PgPool;
use synccoord_application::DependencyProbe;
use synccoord_core::{AppError, AppResult};

use crate::http_retry::endpoint;

/// Pings Redis.
pub struct RedisDependencyProbe {
    client: redis::Client,
}

impl RedisDependencyProbe {
    /// Creates a probe for one Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyProbe for RedisDependencyProbe {
    fn name(&self) -> &str {
        "redis"
    }

    async fn ping(&self) -> AppResult<()> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))?;

        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map(|_| ())
            .map_err(|error| AppError::Unavailable(format!("redis did not answer PING: {error}")))
    }
}

/// Runs `SELECT 1` against PostgreSQL.
pub struct PostgresDependencyProbe {
    pool: PgPool,
}

impl PostgresDependencyProbe {
    /// Creates a probe for one connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyProbe for PostgresDependencyProbe {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|error| AppError::Unavailable(format!("postgres is unreachable: {error}")))
    }
}

/// Calls the `GET /health` endpoint of an HTTP dependency.
pub struct HttpHealthProbe {
    name: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpHealthProbe {
    /// Creates a probe for one HTTP dependency.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        http_client: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            http_client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DependencyProbe for HttpHealthProbe {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn ping(&self) -> AppResult<()> {
        let url = endpoint(self.base_url.as_str(), "health");
        let response = self
            .http_client
            .get(url.as_str())
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("{} is unreachable: {error}", self.name))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "{} health check returned {}",
                self.name,
                response.status()
            )));
        }

        Ok(())
    }
}
