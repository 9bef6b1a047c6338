use crate::backend::CacheBackend;
use crate::error::Error;
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use log::*;
use redis::AsyncCommands;
use std::time::Duration;

const SCAN_BATCH: usize = 200;

/// [`CacheBackend`] over a pooled Redis connection.
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Builds the pool without connecting; connections are opened lazily, so
    /// an unreachable server surfaces as per-operation errors rather than a
    /// start-up failure.
    pub fn connect(redis_url: &str, pool_size: usize) -> Result<Self, Error> {
        let mut config = Config::from_url(redis_url);
        config.pool = Some(PoolConfig::new(pool_size));

        let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::error::CacheErrorKind::Unavailable,
        })?;

        info!("Redis cache pool created (max_size={pool_size})");
        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Error> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let count: u64 = conn.del(keys).await?;
                removed += count;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }
}
