use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::AppError;

use super::KernelCache;

/// The canonical C4 implementation: a single Redis deployment shared across
/// every worker process, so an authorization cache entry or refresh-token
/// fingerprint written on one worker is immediately visible to the others.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(addr: &str, password: Option<&str>, db: i64) -> Result<Self, AppError> {
        let mut url = format!("redis://{addr}/{db}");
        if let Some(password) = password {
            url = format!("redis://:{password}@{addr}/{db}");
        }
        let client = redis::Client::open(url)
            .map_err(|e| AppError::Configuration(format!("invalid redis address: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| AppError::ExternalService(format!("redis connection failed: {e}")))?;
        Ok(Self { conn })
    }
}

fn map_err(e: redis::RedisError) -> AppError {
    AppError::ExternalService(format!("redis error: {e}"))
}

#[async_trait]
impl KernelCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(map_err),
            None => conn.set::<_, _, ()>(key, value).await.map_err(map_err),
        }
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let result: Option<String> = cmd.query_async(&mut conn).await.map_err(map_err)?;
        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(map_err)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, AppError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await.map_err(map_err)?;
        if keys.is_empty() {
            return Ok(0);
        }
        conn.del::<_, ()>(&keys).await.map_err(map_err)?;
        Ok(keys.len() as u64)
    }

    async fn increment(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64, AppError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, by).await.map_err(map_err)?;
        if value == by {
            // first write established the counter; attach its TTL now.
            if let Some(ttl) = ttl {
                conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
                    .await
                    .map_err(map_err)?;
            }
        }
        Ok(value)
    }
}
