pub mod local;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;

pub use local::LocalCache;
pub use redis_cache::RedisCache;

/// C4 Cache Layer contract. The canonical implementation ([`RedisCache`]) is
/// shared across worker processes; [`LocalCache`] is an in-process
/// alternative for data that is fine to be worker-local (e.g. a hot JWKS-style
/// lookup), matching the split the teacher draws between its per-process
/// `moka` caches and anything that must be authoritative across replicas.
#[async_trait]
pub trait KernelCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError>;
    /// Sets only if `key` is absent; returns whether the set happened. Used
    /// for refresh-token fingerprints and distributed locks.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, AppError>;
    async fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64, AppError>;
}
