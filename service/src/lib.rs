use cache::{CacheLayer, RedisBackend};
use config::Config;
use domain::NotificationStore;
use log::*;
use sse::{ConnectionRegistry, EventBroadcaster, EventHistoryStore, HistoryConfig};
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Connects the history cache. An absent or unusable Redis URL yields a
/// disabled cache; the server then runs with in-memory history only.
pub fn init_cache(config: &Config) -> CacheLayer {
    let Some(redis_url) = config.redis_url() else {
        info!("No REDIS_URL configured, event history is kept in memory only");
        return CacheLayer::disabled();
    };

    match RedisBackend::connect(redis_url, config.redis_pool_size) {
        Ok(backend) => {
            info!(
                "Cache pool config: pool_size={}, key_prefix={}, ttl={}s, op_timeout={}ms",
                config.redis_pool_size,
                config.cache_key_prefix,
                config.cache_ttl_secs,
                config.cache_op_timeout_ms,
            );
            CacheLayer::new(Arc::new(backend), config.cache_key_prefix.clone())
                .with_op_timeout(config.cache_op_timeout())
        }
        Err(e) => {
            warn!("Failed to configure Redis cache, continuing without it: {e}");
            CacheLayer::disabled()
        }
    }
}

/// Builds the history store, connection registry and broadcaster around
/// `cache`.
pub fn init_services(config: &Config, cache: CacheLayer) -> AppState {
    let history = Arc::new(EventHistoryStore::new(
        cache,
        HistoryConfig {
            capacity: config.history_capacity,
            cache_ttl: config.cache_ttl(),
        },
    ));
    let registry = Arc::new(ConnectionRegistry::with_buffer(config.connection_buffer));
    let broadcaster = Arc::new(EventBroadcaster::new(history, registry));
    let notifications = Arc::new(NotificationStore::new(config.notification_retention));

    AppState::new(config.clone(), broadcaster, notifications)
}

// Service-level state shared by every request handler
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub broadcaster: Arc<EventBroadcaster>,
    pub notifications: Arc<NotificationStore>,
}

impl AppState {
    pub fn new(
        app_config: Config,
        broadcaster: Arc<EventBroadcaster>,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        Self {
            config: app_config,
            broadcaster,
            notifications,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.broadcaster.registry()
    }

    /// Ends every open stream. Called once the listener stops accepting.
    pub fn shutdown(&self) {
        info!(
            "Closing {} open stream(s)",
            self.registry().total_connections()
        );
        self.registry().close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("realtime_platform").chain(args.iter().copied()))
            .unwrap()
    }

    #[tokio::test]
    async fn init_cache_without_url_is_disabled() {
        let cache = init_cache(&config(&["--redis-url", ""]));
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn init_cache_with_malformed_url_falls_back_to_disabled() {
        let cache = init_cache(&config(&["--redis-url", "not a url"]));
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn init_services_applies_config() {
        let config = config(&["--redis-url", "", "--history-capacity", "2"]);
        let state = init_services(&config, CacheLayer::disabled());

        assert_eq!(state.broadcaster.history().capacity(), 2);

        let (_handle, _rx) = state
            .registry()
            .open_channel("u1".to_string(), Default::default());
        assert_eq!(state.registry().total_connections(), 1);

        state.shutdown();
        assert_eq!(state.registry().total_connections(), 0);
    }
}
