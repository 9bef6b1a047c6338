use crate::error::Error;
use async_trait::async_trait;
use std::time::Duration;

/// Raw key/value operations of an external cache.
///
/// Keys reaching a backend are already namespaced by [`crate::CacheLayer`].
/// Values are JSON text.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Error>;

    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Removes every key starting with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error>;
}
