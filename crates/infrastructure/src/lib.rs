//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod dependency_probes;
mod http_connector_gateway;
mod http_document_index;
mod http_retry;
mod in_memory_coordination;
mod postgres_sync_repository;
mod redis_coordination_store;
mod redis_lock_coordinator;
mod redis_task_queue;

pub use dependency_probes::{HttpHealthProbe, PostgresDependencyProbe, RedisDependencyProbe};
pub use http_connector_gateway::{HttpConnectorEnumerator, HttpConnectorGateway};
pub use http_document_index::HttpDocumentIndex;
pub use http_retry::HttpRetryPolicy;
pub use in_memory_coordination::{
    InMemoryCoordinationStore, InMemoryLockCoordinator, InMemoryTaskQueue,
};
pub use postgres_sync_repository::PostgresSyncRepository;
pub use redis_coordination_store::RedisCoordinationStore;
pub use redis_lock_coordinator::RedisLockCoordinator;
pub use redis_task_queue::RedisTaskQueue;
