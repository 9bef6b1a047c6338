use events::RealtimeEvent;
use serde_json::Value;

/// A decoded `data:` payload from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// First frame of every stream; `replay_count` replayed events follow.
    Connected { replay_count: usize },
    Event(RealtimeEvent),
}

impl ServerFrame {
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(data)?;

        if value.get("type").and_then(Value::as_str) == Some("connected") {
            let replay_count = value
                .get("replayCount")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            return Ok(ServerFrame::Connected { replay_count });
        }

        serde_json::from_value(value).map(ServerFrame::Event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::EventType;

    #[test]
    fn connected_frame_with_and_without_replay_count() {
        assert_eq!(
            ServerFrame::parse(r#"{"type":"connected","timestamp":"2024-01-01T00:00:00Z","replayCount":4}"#)
                .unwrap(),
            ServerFrame::Connected { replay_count: 4 }
        );
        assert_eq!(
            ServerFrame::parse(r#"{"type":"connected","timestamp":"2024-01-01T00:00:00Z"}"#).unwrap(),
            ServerFrame::Connected { replay_count: 0 }
        );
    }

    #[test]
    fn event_frame_decodes_typed_payload() {
        let frame = ServerFrame::parse(
            r#"{"id":"17","type":"quiz-completed","userId":"u1",
                "data":{"quizId":"q1","score":9,"total":10,"passed":true},
                "timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let ServerFrame::Event(event) = frame else {
            panic!("expected an event frame");
        };
        assert_eq!(event.id.value(), 17);
        assert_eq!(event.event_type(), EventType::QuizCompleted);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(ServerFrame::parse("not json").is_err());
        assert!(ServerFrame::parse(r#"{"type":"bogus","data":{}}"#).is_err());
    }
}
