//! Bounded, replayable event history.
//!
//! One ring buffer per `(user, event type)`, newest first, capped at
//! `capacity` entries. Every write is mirrored best-effort into the cache
//! under `events:{user}:{type}` so a restarted process can still serve
//! recent history. Mirrors of one buffer run one at a time, so the cached
//! copy is always the newest snapshot written.
use cache::CacheLayer;
use dashmap::DashMap;
use events::{EventId, EventType, EventTypeSet, RealtimeEvent, UserId};
use futures::future::join_all;
use log::*;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Default)]
struct Buffer {
    events: VecDeque<RealtimeEvent>,
    // Whatever the cache held for this key has been folded into `events`.
    hydrated: bool,
    // Held from snapshot to cache write.
    mirror_turn: Arc<AsyncMutex<()>>,
}

pub struct EventHistoryStore {
    buffers: DashMap<(UserId, EventType), Buffer>,
    cache: CacheLayer,
    config: HistoryConfig,
}

fn cache_key(user_id: &str, event_type: EventType) -> String {
    format!("events:{user_id}:{event_type}")
}

/// Union of two newest-first sequences keyed by id, newest first, at most
/// `capacity` long.
fn merge_newest_first(
    a: impl IntoIterator<Item = RealtimeEvent>,
    b: impl IntoIterator<Item = RealtimeEvent>,
    capacity: usize,
) -> VecDeque<RealtimeEvent> {
    let merged: BTreeMap<EventId, RealtimeEvent> =
        a.into_iter().chain(b).map(|e| (e.id, e)).collect();
    merged.into_values().rev().take(capacity).collect()
}

impl EventHistoryStore {
    pub fn new(cache: CacheLayer, config: HistoryConfig) -> Self {
        Self {
            buffers: DashMap::new(),
            cache,
            config: HistoryConfig {
                capacity: config.capacity.max(1),
                ..config
            },
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Records an event in memory and mirrors its buffer to the cache.
    pub async fn record(&self, event: &RealtimeEvent) {
        self.record_local(event);
        self.mirror(&event.user_id, event.event_type()).await;
    }

    /// Pushes `event` onto the front of its buffer, evicting the oldest entry
    /// when the buffer is full. Never blocks on I/O.
    pub fn record_local(&self, event: &RealtimeEvent) {
        let capacity = self.config.capacity;
        let mut buffer = self
            .buffers
            .entry((event.user_id.clone(), event.event_type()))
            .or_insert_with(|| Buffer {
                events: VecDeque::with_capacity(capacity),
                hydrated: !self.cache.is_enabled(),
                mirror_turn: Arc::default(),
            });

        buffer.events.push_front(event.clone());
        buffer.events.truncate(capacity);
    }

    /// Writes the current in-memory buffer for `(user_id, event_type)` to the
    /// cache. A buffer not yet reconciled with the cache is merged with the
    /// cached copy first, so a fresh process does not overwrite history it
    /// has not loaded. Nothing is written for a buffer that does not exist.
    pub async fn mirror(&self, user_id: &str, event_type: EventType) {
        if !self.cache.is_enabled() {
            return;
        }
        let Some(turn) = self
            .buffers
            .get(&(user_id.to_string(), event_type))
            .map(|buffer| Arc::clone(&buffer.mirror_turn))
        else {
            return;
        };
        // A later caller snapshots only after the earlier write has landed.
        let _turn = turn.lock().await;
        let key = cache_key(user_id, event_type);

        if !self.is_hydrated(user_id, event_type) {
            let cached = self.cache.get::<Vec<RealtimeEvent>>(&key).await;
            self.hydrate(user_id, event_type, cached);
        }

        let snapshot = self.memory_snapshot(user_id, event_type);
        self.cache.set(&key, &snapshot, self.config.cache_ttl).await;
    }

    fn is_hydrated(&self, user_id: &str, event_type: EventType) -> bool {
        self.buffers
            .get(&(user_id.to_string(), event_type))
            .map(|buffer| buffer.hydrated)
            .unwrap_or(false)
    }

    /// Folds a cached copy into the in-memory buffer. Only a hit marks the
    /// buffer reconciled; a miss or a failed read is retried on the next
    /// mirror.
    fn hydrate(&self, user_id: &str, event_type: EventType, cached: Option<Vec<RealtimeEvent>>) {
        let Some(cached) = cached else {
            return;
        };
        let capacity = self.config.capacity;
        let cached = cached
            .into_iter()
            .filter(|e| e.user_id == user_id && e.event_type() == event_type);

        let mut buffer = self
            .buffers
            .entry((user_id.to_string(), event_type))
            .or_default();
        let current = std::mem::take(&mut buffer.events);
        buffer.events = merge_newest_first(current, cached, capacity);
        buffer.hydrated = true;
    }

    fn memory_snapshot(&self, user_id: &str, event_type: EventType) -> Vec<RealtimeEvent> {
        self.buffers
            .get(&(user_id.to_string(), event_type))
            .map(|buffer| buffer.events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Reads one buffer: the cached copy merged with memory, or memory alone
    /// when the cache misses or fails.
    async fn read_buffer(&self, user_id: &str, event_type: EventType) -> Vec<RealtimeEvent> {
        let cached = if self.cache.is_enabled() {
            self.cache
                .get::<Vec<RealtimeEvent>>(&cache_key(user_id, event_type))
                .await
        } else {
            None
        };

        match cached {
            Some(cached) if !cached.is_empty() => {
                self.hydrate(user_id, event_type, Some(cached));
                self.memory_snapshot(user_id, event_type)
            }
            _ => self.memory_snapshot(user_id, event_type),
        }
    }

    /// Most recent events for a user, newest first. With a type, reads that
    /// single buffer; without, merges all seven buffers.
    pub async fn recent_events(
        &self,
        user_id: &str,
        event_type: Option<EventType>,
        limit: usize,
    ) -> Vec<RealtimeEvent> {
        let filter = match event_type {
            Some(event_type) => [event_type].into_iter().collect(),
            None => EventTypeSet::all(),
        };
        self.recent_events_matching(user_id, filter, limit).await
    }

    /// Most recent events across the types admitted by `filter`, newest first.
    /// Merged buffers are ordered by id, which is the order they were recorded
    /// in, never by timestamp.
    pub async fn recent_events_matching(
        &self,
        user_id: &str,
        filter: EventTypeSet,
        limit: usize,
    ) -> Vec<RealtimeEvent> {
        let reads = filter
            .types()
            .into_iter()
            .map(|event_type| self.read_buffer(user_id, event_type));

        let mut events: Vec<RealtimeEvent> = join_all(reads).await.into_iter().flatten().collect();
        events.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        events.truncate(limit);
        events
    }

    /// Forgets every buffer of a user, in memory and in the cache.
    pub async fn clear(&self, user_id: &str) {
        self.buffers.retain(|(owner, _), _| owner != user_id);
        let removed = self.cache.delete_pattern(&format!("events:{user_id}:")).await;
        debug!("Cleared history for user {user_id} ({removed} cached buffer(s) removed)");
    }

    /// Number of events retained in memory across all buffers.
    pub fn total_events(&self) -> usize {
        self.buffers.iter().map(|buffer| buffer.events.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::mock::{FailingBackend, MemoryBackend};
    use chrono::Utc;
    use events::{Activity, EventPayload, QuizCompleted};

    fn activity(id: u64, user_id: &str) -> RealtimeEvent {
        RealtimeEvent {
            id: EventId::new(id),
            user_id: user_id.to_string(),
            payload: EventPayload::Activity(Activity {
                action: format!("action-{id}"),
                description: None,
                metadata: None,
            }),
            timestamp: Utc::now(),
        }
    }

    fn quiz(id: u64, user_id: &str) -> RealtimeEvent {
        RealtimeEvent {
            id: EventId::new(id),
            user_id: user_id.to_string(),
            payload: EventPayload::QuizCompleted(QuizCompleted {
                quiz_id: format!("quiz-{id}"),
                score: 1,
                total: 2,
                passed: false,
            }),
            timestamp: Utc::now(),
        }
    }

    fn ids(events: &[RealtimeEvent]) -> Vec<u64> {
        events.iter().map(|e| e.id.value()).collect()
    }

    fn store_with(cache: CacheLayer, capacity: usize) -> EventHistoryStore {
        EventHistoryStore::new(
            cache,
            HistoryConfig {
                capacity,
                ..HistoryConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn buffer_never_exceeds_capacity_and_evicts_oldest() {
        let store = store_with(CacheLayer::disabled(), 3);
        for id in 1..=4 {
            store.record(&activity(id, "u1")).await;
        }

        let recent = store
            .recent_events("u1", Some(EventType::Activity), 10)
            .await;
        assert_eq!(ids(&recent), vec![4, 3, 2]);
        assert_eq!(store.total_events(), 3);
    }

    #[tokio::test]
    async fn untyped_read_merges_all_types_by_id() {
        let store = store_with(CacheLayer::disabled(), 10);
        store.record(&activity(1, "u1")).await;
        store.record(&quiz(2, "u1")).await;
        store.record(&activity(3, "u1")).await;
        store.record(&quiz(4, "u2")).await;

        let recent = store.recent_events("u1", None, 10).await;
        assert_eq!(ids(&recent), vec![3, 2, 1]);

        let limited = store.recent_events("u1", None, 2).await;
        assert_eq!(ids(&limited), vec![3, 2]);
    }

    #[tokio::test]
    async fn same_timestamp_events_keep_recorded_order() {
        let store = store_with(CacheLayer::disabled(), 10);
        let timestamp = Utc::now();
        for id in [10, 11, 12] {
            let mut event = if id % 2 == 0 {
                activity(id, "u1")
            } else {
                quiz(id, "u1")
            };
            event.timestamp = timestamp;
            store.record(&event).await;
        }

        let recent = store.recent_events("u1", None, 10).await;
        assert_eq!(ids(&recent), vec![12, 11, 10]);
    }

    #[tokio::test]
    async fn record_mirrors_buffer_to_cache() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(CacheLayer::new(backend.clone(), "test"), 10);

        store.record(&activity(1, "u1")).await;

        assert!(backend.contains_key("test:events:u1:activity"));
    }

    #[tokio::test]
    async fn overlapping_mirrors_leave_the_newest_buffer_cached() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(store_with(CacheLayer::new(backend.clone(), "test"), 10));
        backend.delay_next_set(Duration::from_millis(50));

        store.record_local(&activity(1, "u1"));
        let slow = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.mirror("u1", EventType::Activity).await }
        });
        tokio::task::yield_now().await;

        store.record_local(&activity(2, "u1"));
        store.mirror("u1", EventType::Activity).await;
        slow.await.unwrap();

        let cached: Vec<RealtimeEvent> = CacheLayer::new(backend, "test")
            .get("events:u1:activity")
            .await
            .unwrap();
        assert_eq!(ids(&cached), vec![2, 1]);
    }

    #[tokio::test]
    async fn fresh_store_recovers_history_from_cache() {
        let backend = Arc::new(MemoryBackend::new());
        let first = store_with(CacheLayer::new(backend.clone(), "test"), 10);
        first.record(&activity(1, "u1")).await;
        first.record(&activity(2, "u1")).await;

        let restarted = store_with(CacheLayer::new(backend.clone(), "test"), 10);
        restarted.record(&activity(3, "u1")).await;

        let recent = restarted
            .recent_events("u1", Some(EventType::Activity), 10)
            .await;
        assert_eq!(ids(&recent), vec![3, 2, 1]);

        let cached_copy = store_with(CacheLayer::new(backend, "test"), 10);
        let recent = cached_copy.recent_events("u1", None, 10).await;
        assert_eq!(ids(&recent), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn failing_cache_leaves_memory_results_intact() {
        let backend = Arc::new(FailingBackend::new());
        let store = store_with(CacheLayer::new(backend.clone(), "test"), 2);

        for id in 1..=3 {
            store.record(&activity(id, "u1")).await;
        }
        let recent = store.recent_events("u1", None, 10).await;

        assert_eq!(ids(&recent), vec![3, 2]);
        assert!(backend.calls() > 0);
    }

    #[tokio::test]
    async fn clear_drops_memory_and_cached_buffers() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(CacheLayer::new(backend.clone(), "test"), 10);
        store.record(&activity(1, "u1")).await;
        store.record(&quiz(2, "u1")).await;
        store.record(&activity(3, "u2")).await;

        store.clear("u1").await;

        assert!(store.recent_events("u1", None, 10).await.is_empty());
        assert_eq!(ids(&store.recent_events("u2", None, 10).await), vec![3]);
        assert!(!backend.contains_key("test:events:u1:activity"));
        assert!(backend.contains_key("test:events:u2:activity"));
    }
}
