use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::error::AppError;

use super::KernelCache;

/// Per-process cache backed by `moka`, same crate and builder pattern the
/// teacher uses for its JWKS and roles caches.
#[derive(Clone)]
pub struct LocalCache {
    values: Cache<String, String>,
    counters: Cache<String, Arc<AtomicI64>>,
}

impl LocalCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            values: Cache::builder().max_capacity(max_capacity).build(),
            counters: Cache::builder().max_capacity(max_capacity).build(),
        }
    }
}

#[async_trait]
impl KernelCache for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.values.get(key).await)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        // moka's per-entry TTL requires an expiry policy at cache-build time; since
        // this cache is used for short-lived, low-cardinality lookups we approximate
        // per-call TTL by spawning a delayed eviction instead of a second cache tier.
        self.values.insert(key.to_string(), value.to_string()).await;
        if let Some(ttl) = ttl {
            let values = self.values.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                values.invalidate(&key).await;
            });
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, AppError> {
        if self.values.get(key).await.is_some() {
            return Ok(false);
        }
        self.set(key, value, ttl).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.values.invalidate(key).await;
        self.counters.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, AppError> {
        let prefix = pattern.trim_end_matches('*');
        let mut removed = 0u64;
        for key in self.values.iter().map(|(k, _)| k) {
            if key.starts_with(prefix) {
                self.values.invalidate(key.as_str()).await;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64, AppError> {
        let counter = match self.counters.get(key).await {
            Some(existing) => existing,
            None => {
                let fresh = Arc::new(AtomicI64::new(0));
                self.counters.insert(key.to_string(), fresh.clone()).await;
                if let Some(ttl) = ttl {
                    let counters = self.counters.clone();
                    let key = key.to_string();
                    tokio::spawn(async move {
                        tokio::time::sleep(ttl).await;
                        counters.invalidate(&key).await;
                    });
                }
                fresh
            }
        };
        Ok(counter.fetch_add(by, Ordering::SeqCst) + by)
    }
}
