//! In-process backends for tests: a working map with TTLs (and an optional
//! slow write), a backend whose every call fails, and one that never answers.
use crate::backend::CacheBackend;
use crate::error::{CacheErrorKind, Error};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, (String, Instant)>,
    next_set_delay_ms: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Makes the next `set` wait `delay` after receiving its value and
    /// before storing it, as a slow network round trip would.
    pub fn delay_next_set(&self, delay: Duration) {
        self.next_set_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Writes a raw value, bypassing the layer's namespacing.
    pub fn insert_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Error> {
        let delay = self.next_set_delay_ms.swap(0, Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - self.entries.len()) as u64)
    }
}

/// Fails every operation as if the server were unreachable.
#[derive(Default)]
pub struct FailingBackend {
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, Error> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(Error::new(CacheErrorKind::Unavailable))
    }
}

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), Error> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<(), Error> {
        self.fail()
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64, Error> {
        self.fail()
    }
}

/// Never answers; exercises the layer's per-operation timeout.
#[derive(Default)]
pub struct StalledBackend;

#[async_trait]
impl CacheBackend for StalledBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), Error> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> Result<(), Error> {
        std::future::pending().await
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64, Error> {
        std::future::pending().await
    }
}
