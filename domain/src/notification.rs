//! Notifications a user can list and acknowledge after they were pushed.
//!
//! The store only keeps what [`send`] put into it; it is an in-process
//! inbox, not the source of truth for replay (that is the `sse` history).
use crate::error::Error;
use dashmap::DashMap;
use events::{EventId, NewNotification, NotificationEvent, UserId};
use log::*;
use sse::EventBroadcaster;
use std::collections::VecDeque;

pub const DEFAULT_RETENTION: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: usize,
    pub unread_only: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            unread_only: false,
        }
    }
}

/// Per-user notification inbox, oldest first internally, bounded by
/// `retention`.
pub struct NotificationStore {
    inboxes: DashMap<UserId, VecDeque<NotificationEvent>>,
    retention: usize,
}

impl NotificationStore {
    pub fn new(retention: usize) -> Self {
        Self {
            inboxes: DashMap::new(),
            retention: retention.max(1),
        }
    }

    pub fn insert(&self, user_id: &str, notification: NotificationEvent) {
        let mut inbox = self.inboxes.entry(user_id.to_string()).or_default();
        inbox.push_back(notification);
        while inbox.len() > self.retention {
            inbox.pop_front();
        }
    }

    /// Newest first.
    pub fn list(&self, user_id: &str, options: ListOptions) -> Vec<NotificationEvent> {
        let Some(inbox) = self.inboxes.get(user_id) else {
            return Vec::new();
        };
        inbox
            .iter()
            .rev()
            .filter(|n| !options.unread_only || !n.read)
            .take(options.limit)
            .cloned()
            .collect()
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        self.inboxes
            .get(user_id)
            .map(|inbox| inbox.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }

    pub fn mark_read(&self, user_id: &str, id: EventId) -> Result<NotificationEvent, Error> {
        let mut inbox = self.inboxes.get_mut(user_id).ok_or_else(Error::not_found)?;
        let notification = inbox
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(Error::not_found)?;
        notification.read = true;
        Ok(notification.clone())
    }

    /// Returns how many notifications changed from unread to read.
    pub fn mark_all_read(&self, user_id: &str) -> usize {
        let Some(mut inbox) = self.inboxes.get_mut(user_id) else {
            return 0;
        };
        let mut changed = 0;
        for notification in inbox.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            changed += 1;
        }
        changed
    }

    pub fn delete(&self, user_id: &str, id: EventId) -> Result<(), Error> {
        let mut inbox = self.inboxes.get_mut(user_id).ok_or_else(Error::not_found)?;
        let position = inbox
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(Error::not_found)?;
        inbox.remove(position);
        Ok(())
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

/// Files a notification in the user's inbox and pushes it to every open
/// connection of `user_id`. The stored notification carries the event's id.
pub async fn send(
    broadcaster: &EventBroadcaster,
    store: &NotificationStore,
    user_id: &str,
    notification: NewNotification,
) -> Result<NotificationEvent, Error> {
    if notification.title.trim().is_empty() {
        return Err(Error::invalid("notification title must not be empty"));
    }

    // Filed before fan-out so a client can acknowledge it as soon as it arrives.
    let event = broadcaster
        .send_notification(user_id, notification, |sent| {
            store.insert(user_id, sent.clone())
        })
        .await;
    let sent = event
        .payload
        .as_notification()
        .cloned()
        .ok_or_else(|| Error::invalid("broadcast did not produce a notification"))?;

    info!("Notification {} sent to user {user_id}", sent.id);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainErrorKind;
    use cache::CacheLayer;
    use chrono::Utc;
    use events::{EventType, Severity};
    use sse::{ConnectionRegistry, EventHistoryStore, HistoryConfig};
    use std::sync::Arc;

    fn notification(id: u64, title: &str) -> NotificationEvent {
        NewNotification::new(title, "body").into_event(EventId::new(id), Utc::now())
    }

    fn broadcaster() -> EventBroadcaster {
        EventBroadcaster::new(
            Arc::new(EventHistoryStore::new(
                CacheLayer::disabled(),
                HistoryConfig::default(),
            )),
            Arc::new(ConnectionRegistry::new()),
        )
    }

    fn assert_not_found(result: Result<impl std::fmt::Debug, Error>) {
        let err = result.unwrap_err();
        assert_eq!(err.error_kind, DomainErrorKind::NotFound);
    }

    #[test]
    fn list_is_newest_first_and_limited() {
        let store = NotificationStore::default();
        for id in 1..=5 {
            store.insert("u1", notification(id, &format!("n{id}")));
        }

        let ids: Vec<u64> = store
            .list(
                "u1",
                ListOptions {
                    limit: 3,
                    unread_only: false,
                },
            )
            .iter()
            .map(|n| n.id.value())
            .collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert!(store.list("someone-else", ListOptions::default()).is_empty());
    }

    #[test]
    fn retention_drops_oldest() {
        let store = NotificationStore::new(2);
        for id in 1..=3 {
            store.insert("u1", notification(id, "n"));
        }
        let ids: Vec<u64> = store
            .list("u1", ListOptions::default())
            .iter()
            .map(|n| n.id.value())
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn mark_read_updates_unread_count() {
        let store = NotificationStore::default();
        store.insert("u1", notification(1, "a"));
        store.insert("u1", notification(2, "b"));
        assert_eq!(store.unread_count("u1"), 2);

        let read = store.mark_read("u1", EventId::new(1)).unwrap();
        assert!(read.read);
        assert_eq!(store.unread_count("u1"), 1);

        let unread = store.list(
            "u1",
            ListOptions {
                limit: 10,
                unread_only: true,
            },
        );
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, EventId::new(2));
    }

    #[test]
    fn mark_read_of_unknown_id_is_not_found() {
        let store = NotificationStore::default();
        assert_not_found(store.mark_read("u1", EventId::new(1)));
        store.insert("u1", notification(1, "a"));
        assert_not_found(store.mark_read("u1", EventId::new(2)));
    }

    #[test]
    fn mark_all_read_counts_only_changes() {
        let store = NotificationStore::default();
        store.insert("u1", notification(1, "a"));
        store.insert("u1", notification(2, "b"));
        store.mark_read("u1", EventId::new(1)).unwrap();

        assert_eq!(store.mark_all_read("u1"), 1);
        assert_eq!(store.mark_all_read("u1"), 0);
        assert_eq!(store.unread_count("u1"), 0);
        assert_eq!(store.mark_all_read("nobody"), 0);
    }

    #[test]
    fn delete_removes_one_notification() {
        let store = NotificationStore::default();
        store.insert("u1", notification(1, "a"));
        store.insert("u1", notification(2, "b"));

        store.delete("u1", EventId::new(1)).unwrap();
        assert_not_found(store.delete("u1", EventId::new(1)));
        assert_eq!(store.list("u1", ListOptions::default()).len(), 1);
    }

    #[tokio::test]
    async fn send_broadcasts_and_stores_with_event_id() {
        let broadcaster = broadcaster();
        let store = NotificationStore::default();
        let (_handle, mut rx) = broadcaster
            .registry()
            .open_channel("u1".to_string(), Default::default());

        let sent = send(
            &broadcaster,
            &store,
            "u1",
            NewNotification::new("Badge", "You earned a badge").severity(Severity::Success),
        )
        .await
        .unwrap();

        assert!(!sent.read);
        assert_eq!(sent.severity, Severity::Success);

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.id, sent.id);
        assert_eq!(frame.event_type, EventType::Notification);

        let stored = store.list("u1", ListOptions::default());
        assert_eq!(stored, vec![sent]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sent_notification_can_be_marked_read_as_soon_as_it_arrives() {
        let broadcaster = broadcaster();
        let store = Arc::new(NotificationStore::default());
        let (_handle, mut rx) = broadcaster
            .registry()
            .open_channel("u1".to_string(), Default::default());

        let reader = tokio::spawn({
            let store = Arc::clone(&store);
            async move {
                let frame = rx.recv().await.unwrap();
                store.mark_read("u1", frame.id).map(|n| n.read)
            }
        });

        send(&broadcaster, &store, "u1", NewNotification::new("Hi", "there"))
            .await
            .unwrap();

        assert!(reader.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn send_rejects_empty_title() {
        let broadcaster = broadcaster();
        let store = NotificationStore::default();

        let err = send(&broadcaster, &store, "u1", NewNotification::new("  ", "body"))
            .await
            .unwrap_err();
        assert_eq!(err.error_kind, DomainErrorKind::Invalid);
        assert_eq!(broadcaster.history().total_events(), 0);
    }
}
