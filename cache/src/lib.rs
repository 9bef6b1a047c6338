//! Best-effort key/value cache in front of an optional external store.
//!
//! [`CacheLayer`] is the only type the rest of the workspace talks to. Every
//! operation swallows backend errors (logging them) and behaves as a miss or
//! a no-op, so callers stay correct when the cache is misconfigured, down, or
//! absent altogether.
//!
//! # Modules
//!
//! - `backend`: the [`CacheBackend`] trait implemented by concrete stores
//! - `redis_backend`: pooled Redis backend (deadpool-redis)
//! - `error`: backend error tree, never surfaced past the layer
//! - `mock` (feature `mock`): in-process backends for tests

use log::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub mod backend;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod redis_backend;

pub use backend::CacheBackend;
pub use redis_backend::RedisBackend;

use error::{CacheErrorKind, Error};

pub const DEFAULT_NAMESPACE: &str = "realtime";
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct CacheLayer {
    backend: Option<Arc<dyn CacheBackend>>,
    namespace: String,
    op_timeout: Duration,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            namespace: namespace.into(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// A layer with no backend: every read misses and every write is dropped.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let key = self.namespaced(key);
        let raw = self.guard("get", &key, backend.get(&key)).await.flatten()?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {key}: {e}");
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let key = self.namespaced(key);

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to serialize cache entry {key}: {e}");
                return;
            }
        };

        self.guard("set", &key, backend.set(&key, raw, ttl)).await;
    }

    pub async fn delete(&self, key: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let key = self.namespaced(key);
        self.guard("delete", &key, backend.delete(&key)).await;
    }

    /// Deletes every key under `prefix` in this layer's namespace and
    /// returns how many were removed (0 on failure).
    pub async fn delete_pattern(&self, prefix: &str) -> u64 {
        let Some(backend) = self.backend.as_ref() else {
            return 0;
        };
        let prefix = self.namespaced(prefix);
        self.guard("delete_pattern", &prefix, backend.delete_prefix(&prefix))
            .await
            .unwrap_or(0)
    }

    /// Bounds a backend call by the operation timeout and turns any failure
    /// into `None` after logging it.
    async fn guard<T>(
        &self,
        op: &str,
        key: &str,
        call: impl Future<Output = Result<T, Error>>,
    ) -> Option<T> {
        let outcome = match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::new(CacheErrorKind::Timeout)),
        };

        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cache {op} failed for {key}, continuing without cache: {e}");
                None
            }
        }
    }
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{FailingBackend, MemoryBackend, StalledBackend};
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
        count: u32,
    }

    fn entry() -> Entry {
        Entry {
            name: "a".to_string(),
            count: 3,
        }
    }

    #[tokio::test]
    async fn set_then_get_returns_value_under_namespace() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheLayer::new(backend.clone(), "test");

        cache.set("events:u1", &entry(), Duration::from_secs(60)).await;

        assert!(backend.contains_key("test:events:u1"));
        assert_eq!(cache.get::<Entry>("events:u1").await, Some(entry()));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = CacheLayer::new(Arc::new(MemoryBackend::new()), "test");
        cache.set("k", &entry(), Duration::from_secs(5)).await;

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.get::<Entry>("k").await, None);
    }

    #[tokio::test]
    async fn delete_pattern_only_removes_matching_prefix() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheLayer::new(backend.clone(), "test");
        let ttl = Duration::from_secs(60);
        cache.set("events:u1:activity", &1, ttl).await;
        cache.set("events:u1:notification", &2, ttl).await;
        cache.set("events:u2:activity", &3, ttl).await;

        let removed = cache.delete_pattern("events:u1:").await;

        assert_eq!(removed, 2);
        assert_eq!(cache.get::<u32>("events:u2:activity").await, Some(3));
        assert_eq!(cache.get::<u32>("events:u1:activity").await, None);
    }

    #[tokio::test]
    async fn delete_removes_single_key() {
        let cache = CacheLayer::new(Arc::new(MemoryBackend::new()), "test");
        cache.set("k", &entry(), Duration::from_secs(60)).await;
        cache.delete("k").await;
        assert_eq!(cache.get::<Entry>("k").await, None);
    }

    #[tokio::test]
    async fn failing_backend_degrades_to_miss_and_no_op() {
        let backend = Arc::new(FailingBackend::new());
        let cache = CacheLayer::new(backend.clone(), "test");

        cache.set("k", &entry(), Duration::from_secs(60)).await;
        assert_eq!(cache.get::<Entry>("k").await, None);
        cache.delete("k").await;
        assert_eq!(cache.delete_pattern("k").await, 0);

        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_is_bounded_by_timeout() {
        let cache = CacheLayer::new(Arc::new(StalledBackend), "test")
            .with_op_timeout(Duration::from_millis(50));

        assert_eq!(cache.get::<Entry>("k").await, None);
        cache.set("k", &entry(), Duration::from_secs(60)).await;
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw("test:k", "not json", Duration::from_secs(60));
        let cache = CacheLayer::new(backend, "test");

        assert_eq!(cache.get::<Entry>("k").await, None);
    }

    #[tokio::test]
    async fn disabled_layer_never_hits() {
        let cache = CacheLayer::disabled();
        assert!(!cache.is_enabled());
        cache.set("k", &entry(), Duration::from_secs(60)).await;
        assert_eq!(cache.get::<Entry>("k").await, None);
    }
}
