use axum::response::sse::Event as SseEvent;
use chrono::{DateTime, Utc};
use events::{EventId, EventType, RealtimeEvent};
use serde_json::json;
use std::sync::Arc;

/// A [`RealtimeEvent`] serialized once for fan-out. Cloning shares the JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub id: EventId,
    pub event_type: EventType,
    json: Arc<str>,
}

impl EventFrame {
    pub fn encode(event: &RealtimeEvent) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(event)?;
        Ok(Self {
            id: event.id,
            event_type: event.event_type(),
            json: json.into(),
        })
    }

    pub fn json(&self) -> &str {
        &self.json
    }
}

/// One unit of a stream's output, rendered on the wire as
/// `data: <json>\n\n`.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Always the first frame of a stream. `replay_count` events follow it
    /// before live delivery starts.
    Connected {
        timestamp: DateTime<Utc>,
        replay_count: usize,
    },
    Event(EventFrame),
}

impl Frame {
    pub fn connected(replay_count: usize) -> Self {
        Frame::Connected {
            timestamp: Utc::now(),
            replay_count,
        }
    }

    pub fn data(&self) -> String {
        match self {
            Frame::Connected {
                timestamp,
                replay_count,
            } => json!({
                "type": "connected",
                "timestamp": timestamp,
                "replayCount": replay_count,
            })
            .to_string(),
            Frame::Event(frame) => frame.json().to_string(),
        }
    }

    /// The full text of this frame as written to the response body.
    pub fn to_wire(&self) -> String {
        format!("data: {}\n\n", self.data())
    }

    pub fn to_sse_event(&self) -> SseEvent {
        SseEvent::default().data(self.data())
    }
}
