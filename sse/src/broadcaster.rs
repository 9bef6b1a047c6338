use crate::connection::{ConnectionRegistry, Delivery};
use crate::history::EventHistoryStore;
use crate::message::EventFrame;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use events::{
    EventId, EventIdGenerator, EventPayload, NewNotification, NotificationEvent, RealtimeEvent,
    UserId,
};
use log::*;
use parking_lot::Mutex;
use std::sync::Arc;

/// The write path: stamps events, records them, and fans them out to the
/// user's open connections.
///
/// Safe to call concurrently. Calls for the same user are sequenced so that
/// id order, history order and per-connection delivery order all agree;
/// calls for different users never wait on each other.
pub struct EventBroadcaster {
    ids: EventIdGenerator,
    history: Arc<EventHistoryStore>,
    registry: Arc<ConnectionRegistry>,
    sequencers: DashMap<UserId, Arc<Mutex<()>>>,
}

impl EventBroadcaster {
    pub fn new(history: Arc<EventHistoryStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_id_generator(history, registry, EventIdGenerator::new())
    }

    pub fn with_id_generator(
        history: Arc<EventHistoryStore>,
        registry: Arc<ConnectionRegistry>,
        ids: EventIdGenerator,
    ) -> Self {
        Self {
            ids,
            history,
            registry,
            sequencers: DashMap::new(),
        }
    }

    pub fn history(&self) -> &Arc<EventHistoryStore> {
        &self.history
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Runs `f` inside the user's critical section. The user's entry is
    /// dropped again once no other caller holds or waits on it.
    fn in_turn<R>(&self, user_id: &str, f: impl FnOnce() -> R) -> R {
        let sequencer = match self.sequencers.get(user_id) {
            Some(sequencer) => Arc::clone(&sequencer),
            None => Arc::clone(&self.sequencers.entry(user_id.to_string()).or_default()),
        };

        let result = {
            let _turn = sequencer.lock();
            f()
        };

        drop(sequencer);
        self.sequencers
            .remove_if(user_id, |_, sequencer| Arc::strong_count(sequencer) == 1);
        result
    }

    /// Stamps `payload` with a fresh id and the current time, records it and
    /// pushes it to every open connection of `user_id`. Delivery failures are
    /// handled by the registry and never surface here.
    pub async fn broadcast_event(&self, user_id: &str, payload: EventPayload) -> RealtimeEvent {
        let (event, delivery) =
            self.in_turn(user_id, || self.stamp_and_deliver(user_id, |_, _| payload));

        debug!(
            "Broadcast {} event {} to user {user_id}: delivered={}, evicted={}",
            event.event_type(),
            event.id,
            delivery.delivered,
            delivery.evicted
        );

        self.history.mirror(user_id, event.event_type()).await;
        event
    }

    /// Broadcasts an unread notification whose id is the carrying event's id.
    /// `before_delivery` sees the stamped notification before any connection
    /// does, so whatever it files is in place by the time a client reacts.
    pub async fn send_notification(
        &self,
        user_id: &str,
        notification: NewNotification,
        before_delivery: impl FnOnce(&NotificationEvent),
    ) -> RealtimeEvent {
        let (event, delivery) = self.in_turn(user_id, || {
            self.stamp_and_deliver(user_id, |id, created_at| {
                let notification = notification.into_event(id, created_at);
                before_delivery(&notification);
                EventPayload::Notification(notification)
            })
        });

        debug!(
            "Sent notification {} to user {user_id}: delivered={}, evicted={}",
            event.id, delivery.delivered, delivery.evicted
        );

        self.history.mirror(user_id, event.event_type()).await;
        event
    }

    /// Must run inside the user's sequencer.
    fn stamp_and_deliver(
        &self,
        user_id: &str,
        build: impl FnOnce(EventId, DateTime<Utc>) -> EventPayload,
    ) -> (RealtimeEvent, Delivery) {
        let id = self.ids.next_id();
        let timestamp = Utc::now();
        let event = RealtimeEvent {
            id,
            user_id: user_id.to_string(),
            payload: build(id, timestamp),
            timestamp,
        };

        self.history.record_local(&event);

        let delivery = match EventFrame::encode(&event) {
            Ok(frame) => self.registry.broadcast(user_id, &frame),
            Err(e) => {
                error!("Failed to serialize event {}: {e}", event.id);
                Delivery::default()
            }
        };

        (event, delivery)
    }
}
