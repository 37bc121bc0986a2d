//! Redis-backed distributed locks with owner tokens.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use synccoord_application::{LockCoordinator, LockLease};
use synccoord_core::{AppError, AppResult};

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const REACQUIRE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Redis implementation of the lock coordinator port.
#[derive(Clone)]
pub struct RedisLockCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLockCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, lock_key: &str) -> String {
        format!("{}:{lock_key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

fn ttl_millis(ttl: Duration) -> AppResult<u64> {
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Err(AppError::Validation(
            "lock ttl must be at least one millisecond".to_owned(),
        ));
    }

    Ok(millis)
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> AppResult<Option<LockLease>> {
        if key.trim().is_empty() {
            return Err(AppError::Validation("lock key must not be empty".to_owned()));
        }

        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "lock holder_id must not be empty".to_owned(),
            ));
        }

        let millis = ttl_millis(ttl)?;
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection().await?;

        // SET NX PX keeps value and expiry in one command so a crash never
        // leaves an immortal lock behind.
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key_for(key))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire lock '{key}': {error}"))
            })?;

        if reply.is_none() {
            return Ok(None);
        }

        Ok(Some(LockLease {
            key: key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
            ttl,
        }))
    }

    async fn reacquire(&self, lease: &LockLease) -> AppResult<bool> {
        let millis = ttl_millis(lease.ttl)?;
        let mut connection = self.connection().await?;

        let renewed = Script::new(REACQUIRE_LOCK_SCRIPT)
            .key(self.key_for(lease.key.as_str()))
            .arg(lease.token.as_str())
            .arg(millis)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to extend lock '{}': {error}", lease.key))
            })?;

        Ok(renewed == 1)
    }

    async fn release(&self, lease: &LockLease) -> AppResult<()> {
        let mut connection = self.connection().await?;

        Script::new(RELEASE_LOCK_SCRIPT)
            .key(self.key_for(lease.key.as_str()))
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release lock '{}': {error}", lease.key))
            })?;

        Ok(())
    }

    async fn owned(&self, lease: &LockLease) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        let current: Option<String> = connection
            .get(self.key_for(lease.key.as_str()))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read lock '{}': {error}", lease.key))
            })?;

        Ok(current.as_deref() == Some(lease.token.as_str()))
    }
}
