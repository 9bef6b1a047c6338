//! Event data model for the real-time delivery subsystem.
//!
//! This crate provides the types shared by the broadcaster, the web layer and
//! the client:
//!
//! - **EventType**: the closed set of event kinds, plus [`EventTypeSet`] for
//!   subscription filters
//! - **EventId**: process-monotonic identifiers that define delivery order
//! - **EventPayload**: tagged union with one concrete schema per event type
//! - **RealtimeEvent**: a stamped, immutable event as stored and delivered
//!
//! This crate has no dependencies on internal crates, so every other crate in
//! the workspace can depend on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod event_type;
mod id;
mod payload;

pub use event_type::{EventType, EventTypeSet, UnknownEventType};
pub use id::{EventId, EventIdGenerator};
pub use payload::{
    AchievementUnlocked, Activity, ChangeKind, EventPayload, NewNotification, NotificationEvent,
    PortfolioUpdate, QuizCompleted, RoadmapUpdate, Severity, SkillProgress,
};

/// User ids are opaque strings; identity is established by the caller.
pub type UserId = String;

/// A single event addressed to one user. Never mutated after creation.
///
/// Wire form: `{"id", "type", "userId", "data", "timestamp"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub struct RealtimeEvent {
    pub id: EventId,
    pub user_id: UserId,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl RealtimeEvent {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    id: EventId,
    #[serde(rename = "type")]
    event_type: EventType,
    user_id: UserId,
    data: Value,
    timestamp: DateTime<Utc>,
}

impl From<RealtimeEvent> for WireEvent {
    fn from(event: RealtimeEvent) -> Self {
        let event_type = event.event_type();
        // Every payload variant is a plain struct of serializable fields.
        let data = event.payload.data().unwrap_or(Value::Null);
        WireEvent {
            id: event.id,
            event_type,
            user_id: event.user_id,
            data,
            timestamp: event.timestamp,
        }
    }
}

impl TryFrom<WireEvent> for RealtimeEvent {
    type Error = serde_json::Error;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        Ok(RealtimeEvent {
            id: wire.id,
            user_id: wire.user_id,
            payload: EventPayload::from_parts(wire.event_type, wire.data)?,
            timestamp: wire.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> RealtimeEvent {
        RealtimeEvent {
            id: EventId::new(42),
            user_id: "u1".to_string(),
            payload: EventPayload::SkillProgress(SkillProgress {
                skill_id: "rust".to_string(),
                skill_name: "Rust".to_string(),
                progress: 60,
                level: None,
            }),
            timestamp: "2026-01-02T03:04:05Z".parse().unwrap(),
        }
    }

    #[test]
    fn realtime_event_wire_shape() {
        let value = serde_json::to_value(sample_event()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "42",
                "type": "skill-progress",
                "userId": "u1",
                "data": {"skillId": "rust", "skillName": "Rust", "progress": 60},
                "timestamp": "2026-01-02T03:04:05Z"
            })
        );
    }

    #[test]
    fn realtime_event_decodes_from_wire() {
        let json = serde_json::to_string(&sample_event()).unwrap();
        let decoded: RealtimeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, sample_event());
    }

    #[test]
    fn mismatched_type_and_data_fail_to_decode() {
        let wire = json!({
            "id": "1",
            "type": "quiz-completed",
            "userId": "u1",
            "data": {"skillId": "rust"},
            "timestamp": "2026-01-02T03:04:05Z"
        });
        assert!(serde_json::from_value::<RealtimeEvent>(wire).is_err());
    }
}
