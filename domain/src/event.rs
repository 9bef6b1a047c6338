//! Typed events pushed on behalf of a user, and the user's recent history.
use crate::error::Error;
use events::{EventPayload, EventType, EventTypeSet, RealtimeEvent};
use serde_json::Value;
use sse::EventBroadcaster;

pub const MAX_RECENT_LIMIT: usize = 500;

/// Validates `data` against the schema of `event_type` and broadcasts it.
/// Notifications have their own path (they are also filed in the inbox) and
/// are rejected here.
pub async fn publish(
    broadcaster: &EventBroadcaster,
    user_id: &str,
    event_type: EventType,
    data: Value,
) -> Result<RealtimeEvent, Error> {
    if event_type == EventType::Notification {
        return Err(Error::invalid(
            "notifications are sent through the notification endpoint",
        ));
    }

    let payload = EventPayload::from_parts(event_type, data)?;
    Ok(broadcaster.broadcast_event(user_id, payload).await)
}

/// Newest first, across the types admitted by `filter`.
pub async fn recent(
    broadcaster: &EventBroadcaster,
    user_id: &str,
    filter: EventTypeSet,
    limit: usize,
) -> Vec<RealtimeEvent> {
    broadcaster
        .history()
        .recent_events_matching(user_id, filter, limit.min(MAX_RECENT_LIMIT))
        .await
}

/// Forgets the user's replay history. Open connections stay open.
pub async fn clear_history(broadcaster: &EventBroadcaster, user_id: &str) {
    broadcaster.history().clear(user_id).await;
}
