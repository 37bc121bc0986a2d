//! Redis-backed coordination store for fences, trackers, and markers.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use synccoord_application::{CoordinationStore, StoreReplicationInfo};
use synccoord_core::{AppError, AppResult};

const SCAN_BATCH_SIZE: u32 = 500;

/// Redis implementation of the coordination store port.
#[derive(Clone)]
pub struct RedisCoordinationStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisCoordinationStore {
    /// Creates a store adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }

    /// Full keys matching a relative pattern, iterated with `SCAN`.
    async fn scan(&self, connection: &mut MultiplexedConnection, pattern: &str) -> AppResult<Vec<String>> {
        let pattern = self.key_for(pattern);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern.as_str())
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(connection)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to scan keys matching '{pattern}': {error}"))
                })?;

            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection().await?;
        connection
            .get(self.key_for(key))
            .await
            .map_err(|error| AppError::Internal(format!("failed to read key '{key}': {error}")))
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .set::<_, _, ()>(self.key_for(key), value)
            .await
            .map_err(|error| AppError::Internal(format!("failed to write key '{key}': {error}")))
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let full_keys: Vec<String> = keys.iter().map(|key| self.key_for(key)).collect();
        let mut connection = self.connection().await?;
        connection
            .del::<_, ()>(full_keys)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete keys: {error}")))
    }

    async fn set_add(&self, key: &str, members: &[String]) -> AppResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut connection = self.connection().await?;
        connection
            .sadd(self.key_for(key), members)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to add members to set '{key}': {error}"))
            })
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        let removed: u64 = connection
            .srem(self.key_for(key), member)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to remove member from set '{key}': {error}"))
            })?;

        Ok(removed > 0)
    }

    async fn set_card(&self, key: &str) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        connection
            .scard(self.key_for(key))
            .await
            .map_err(|error| AppError::Internal(format!("failed to count set '{key}': {error}")))
    }

    async fn keys_matching(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut connection = self.connection().await?;
        let prefix = self.key_for("");

        Ok(self
            .scan(&mut connection, pattern)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(prefix.as_str()).map(ToOwned::to_owned))
            .collect())
    }

    async fn delete_matching(&self, pattern: &str) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        let keys = self.scan(&mut connection, pattern).await?;
        let mut deleted = 0;

        for batch in keys.chunks(SCAN_BATCH_SIZE as usize) {
            let removed: u64 = connection.del(batch).await.map_err(|error| {
                AppError::Internal(format!(
                    "failed to delete keys matching '{pattern}': {error}"
                ))
            })?;
            deleted += removed;
        }

        Ok(deleted)
    }

    async fn replication_info(&self) -> AppResult<StoreReplicationInfo> {
        let mut connection = self.connection().await?;
        let info: String = redis::cmd("INFO")
            .arg("replication")
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read redis replication info: {error}"))
            })?;

        parse_replication_info(info.as_str())
    }
}

fn parse_replication_info(info: &str) -> AppResult<StoreReplicationInfo> {
    let mut role = None;
    let mut connected_replicas = 0;

    for line in info.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("role:") {
            role = Some(value.to_owned());
        } else if let Some(value) = line.strip_prefix("connected_slaves:") {
            connected_replicas = value.parse::<u32>().map_err(|error| {
                AppError::Internal(format!(
                    "invalid connected_slaves value '{value}' in replication info: {error}"
                ))
            })?;
        }
    }

    let role = role.ok_or_else(|| {
        AppError::Internal("redis replication info does not report a role".to_owned())
    })?;

    Ok(StoreReplicationInfo {
        role,
        connected_replicas,
    })
}
