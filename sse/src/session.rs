//! Server side of one streaming connection.
//!
//! A session moves `Opening -> (Replaying ->) Live -> Closed`. It registers
//! its channel before reading history, so nothing broadcast while replay is
//! being computed is lost; frames seen both in history and on the live
//! channel are delivered once.
use crate::broadcaster::EventBroadcaster;
use crate::connection::ConnectionHandle;
use crate::history::EventHistoryStore;
use crate::message::{EventFrame, Frame};
use async_stream::stream;
use events::{EventId, EventTypeSet, UserId};
use futures::Stream;
use log::*;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Replaying,
    Live,
    Closed,
}

pub struct StreamSession {
    user_id: UserId,
    filter: EventTypeSet,
    state: SessionState,
    last_event_id: Option<String>,
    // Highest id handed to the client so far; live frames at or below it are duplicates.
    last_delivered: Option<EventId>,
    handle: Option<ConnectionHandle>,
    receiver: Receiver<EventFrame>,
    history: Arc<EventHistoryStore>,
}

impl StreamSession {
    /// Registers a new connection for `user_id`. With a `last_event_id` the
    /// session starts in `Replaying`, otherwise directly in `Live`.
    pub fn open(
        broadcaster: &EventBroadcaster,
        user_id: UserId,
        filter: EventTypeSet,
        last_event_id: Option<String>,
    ) -> Self {
        let (handle, receiver) = broadcaster
            .registry()
            .open_channel(user_id.clone(), filter);

        let last_event_id = last_event_id.filter(|id| !id.trim().is_empty());
        let state = if last_event_id.is_some() {
            SessionState::Replaying
        } else {
            SessionState::Live
        };

        info!(
            "Opened stream {} for user {user_id} (replay from {:?})",
            handle.id().as_str(),
            last_event_id
        );

        Self {
            user_id,
            filter,
            state,
            last_event_id,
            last_delivered: None,
            handle: Some(handle),
            receiver,
            history: Arc::clone(broadcaster.history()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Computes the frames the client missed, oldest first, and moves to
    /// `Live`. Replay is skipped when the last seen id is not in the retained
    /// window: nothing is invented for the gap.
    pub async fn replay(&mut self) -> Vec<EventFrame> {
        if self.state != SessionState::Replaying {
            return Vec::new();
        }
        self.state = SessionState::Live;

        let Some(raw_id) = self.last_event_id.take() else {
            return Vec::new();
        };
        let Ok(last_seen) = raw_id.parse::<EventId>() else {
            debug!("Ignoring malformed lastEventId {raw_id:?}");
            return Vec::new();
        };

        let window = self.history.capacity() * self.filter.types().len();
        let recent = self
            .history
            .recent_events_matching(&self.user_id, self.filter, window)
            .await;

        let Some(position) = recent.iter().position(|event| event.id == last_seen) else {
            info!(
                "lastEventId {last_seen} for user {} is outside the retained history, skipping replay",
                self.user_id
            );
            return Vec::new();
        };

        self.last_delivered = Some(last_seen);
        let frames: Vec<EventFrame> = recent[..position]
            .iter()
            .rev()
            .filter_map(|event| match EventFrame::encode(event) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    error!("Failed to serialize replayed event {}: {e}", event.id);
                    None
                }
            })
            .collect();

        if let Some(newest) = frames.last() {
            self.last_delivered = Some(newest.id);
        }
        debug!(
            "Replaying {} event(s) to user {} after {last_seen}",
            frames.len(),
            self.user_id
        );
        frames
    }

    /// Waits for the next live frame. `None` means the connection was closed
    /// (evicted, cancelled or the server is shutting down).
    pub async fn next_frame(&mut self) -> Option<EventFrame> {
        if self.state == SessionState::Closed {
            return None;
        }

        while let Some(frame) = self.receiver.recv().await {
            if self.last_delivered.is_some_and(|last| frame.id <= last) {
                continue;
            }
            self.last_delivered = Some(frame.id);
            return Some(frame);
        }

        self.close();
        None
    }

    /// Unregisters the connection. Terminal and idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        if let Some(handle) = self.handle.take() {
            info!(
                "Closed stream {} for user {}",
                handle.id().as_str(),
                self.user_id
            );
            handle.cancel();
        }
        self.receiver.close();
    }

    /// Drives the session as a stream: the `connected` frame, any replayed
    /// frames, then live frames until the connection closes. Dropping the
    /// stream (client went away) closes the session.
    pub fn into_stream(mut self) -> impl Stream<Item = Frame> {
        stream! {
            let replayed = self.replay().await;
            yield Frame::connected(replayed.len());

            for frame in replayed {
                yield Frame::Event(frame);
            }

            while let Some(frame) = self.next_frame().await {
                yield Frame::Event(frame);
            }

            debug!("Stream for user {} ended", self.user_id());
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionRegistry;
    use crate::history::HistoryConfig;
    use cache::CacheLayer;
    use events::{Activity, EventPayload, EventType, RealtimeEvent, SkillProgress};
    use futures::StreamExt;
    use serde_json::Value;
    use std::time::Duration;

    fn broadcaster(capacity: usize) -> EventBroadcaster {
        let history = Arc::new(EventHistoryStore::new(
            CacheLayer::disabled(),
            HistoryConfig {
                capacity,
                ..HistoryConfig::default()
            },
        ));
        EventBroadcaster::new(history, Arc::new(ConnectionRegistry::new()))
    }

    fn activity(n: usize) -> EventPayload {
        EventPayload::Activity(Activity {
            action: format!("step-{n}"),
            description: None,
            metadata: None,
        })
    }

    fn skill(n: u8) -> EventPayload {
        EventPayload::SkillProgress(SkillProgress {
            skill_id: "rust".to_string(),
            skill_name: "Rust".to_string(),
            progress: n,
            level: None,
        })
    }

    async fn broadcast_n(broadcaster: &EventBroadcaster, n: usize) -> Vec<RealtimeEvent> {
        let mut sent = Vec::new();
        for i in 0..n {
            sent.push(broadcaster.broadcast_event("u1", activity(i)).await);
        }
        sent
    }

    fn frame_id(frame: &Frame) -> EventId {
        match frame {
            Frame::Event(frame) => frame.id,
            Frame::Connected { .. } => panic!("expected an event frame, got connected"),
        }
    }

    #[tokio::test]
    async fn session_without_last_id_goes_straight_live() {
        let broadcaster = broadcaster(10);
        let session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            None,
        );
        assert_eq!(session.state(), SessionState::Live);
        assert_eq!(broadcaster.registry().connection_count("u1"), 1);
    }

    #[tokio::test]
    async fn replay_returns_exactly_the_missed_events_in_order() {
        let broadcaster = broadcaster(10);
        let sent = broadcast_n(&broadcaster, 5).await;

        let mut session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            Some(sent[1].id.to_string()),
        );
        assert_eq!(session.state(), SessionState::Replaying);

        let replayed: Vec<EventId> = session.replay().await.iter().map(|f| f.id).collect();

        assert_eq!(replayed, vec![sent[2].id, sent[3].id, sent[4].id]);
        assert_eq!(session.state(), SessionState::Live);
    }

    #[tokio::test]
    async fn replay_of_newest_id_yields_nothing() {
        let broadcaster = broadcaster(10);
        let sent = broadcast_n(&broadcaster, 3).await;

        let mut session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            Some(sent[2].id.to_string()),
        );

        assert!(session.replay().await.is_empty());
    }

    #[tokio::test]
    async fn evicted_last_id_skips_replay_and_resumes_live() {
        let broadcaster = broadcaster(3);
        let sent = broadcast_n(&broadcaster, 5).await;

        let mut session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            Some(sent[0].id.to_string()),
        );
        assert!(session.replay().await.is_empty());

        let live = broadcaster.broadcast_event("u1", activity(99)).await;
        assert_eq!(session.next_frame().await.unwrap().id, live.id);
    }

    #[tokio::test]
    async fn malformed_last_id_skips_replay() {
        let broadcaster = broadcaster(10);
        broadcast_n(&broadcaster, 2).await;

        let mut session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            Some("not-an-id".to_string()),
        );
        assert!(session.replay().await.is_empty());
        assert_eq!(session.state(), SessionState::Live);
    }

    #[tokio::test]
    async fn replay_respects_type_filter() {
        let broadcaster = broadcaster(10);
        let first = broadcaster.broadcast_event("u1", skill(10)).await;
        broadcaster.broadcast_event("u1", activity(1)).await;
        let second = broadcaster.broadcast_event("u1", skill(20)).await;

        let filter: EventTypeSet = [EventType::SkillProgress].into_iter().collect();
        let mut session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            filter,
            Some(first.id.to_string()),
        );

        let replayed: Vec<EventId> = session.replay().await.iter().map(|f| f.id).collect();
        assert_eq!(replayed, vec![second.id]);
    }

    #[tokio::test]
    async fn live_frames_overlapping_replay_are_delivered_once() {
        let broadcaster = broadcaster(10);
        let sent = broadcast_n(&broadcaster, 2).await;

        let mut session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            Some(sent[0].id.to_string()),
        );
        // Broadcast after registration but before replay: lands in history
        // and on the live channel.
        let overlap = broadcaster.broadcast_event("u1", activity(2)).await;
        let after = broadcaster.broadcast_event("u1", activity(3)).await;

        let replayed: Vec<EventId> = session.replay().await.iter().map(|f| f.id).collect();
        assert_eq!(replayed, vec![sent[1].id, overlap.id, after.id]);

        let next = broadcaster.broadcast_event("u1", activity(4)).await;
        assert_eq!(session.next_frame().await.unwrap().id, next.id);
    }

    #[tokio::test]
    async fn closing_unregisters_and_is_terminal() {
        let broadcaster = broadcaster(10);
        let mut session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            None,
        );

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(broadcaster.registry().connection_count("u1"), 0);

        broadcaster.broadcast_event("u1", activity(1)).await;
        assert!(session.next_frame().await.is_none());
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn stream_starts_with_connected_then_replay_then_live() {
        let broadcaster = broadcaster(10);
        let sent = broadcast_n(&broadcaster, 3).await;

        let session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            Some(sent[0].id.to_string()),
        );
        let stream = session.into_stream();
        futures::pin_mut!(stream);

        let connected = stream.next().await.unwrap();
        let value: Value = serde_json::from_str(&connected.data()).unwrap();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["replayCount"], 2);

        assert_eq!(frame_id(&stream.next().await.unwrap()), sent[1].id);
        assert_eq!(frame_id(&stream.next().await.unwrap()), sent[2].id);

        let live = broadcaster.broadcast_event("u1", activity(9)).await;
        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame_id(&next), live.id);
    }

    #[tokio::test]
    async fn dropping_the_stream_unregisters_the_connection() {
        let broadcaster = broadcaster(10);
        let session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            None,
        );
        let stream = session.into_stream();
        assert_eq!(broadcaster.registry().connection_count("u1"), 1);

        drop(stream);
        assert_eq!(broadcaster.registry().connection_count("u1"), 0);
    }

    #[tokio::test]
    async fn registry_shutdown_ends_the_stream() {
        let broadcaster = broadcaster(10);
        let session = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            None,
        );
        let stream = session.into_stream();
        futures::pin_mut!(stream);
        assert!(matches!(
            stream.next().await,
            Some(Frame::Connected { .. })
        ));

        broadcaster.registry().close_all();

        let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn two_connections_one_unregisters() {
        let broadcaster = broadcaster(10);
        let mut first = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            None,
        );
        let mut second = StreamSession::open(
            &broadcaster,
            "u1".to_string(),
            EventTypeSet::all(),
            None,
        );

        first.close();
        let event = broadcaster.broadcast_event("u1", activity(1)).await;

        assert_eq!(second.next_frame().await.unwrap().id, event.id);
        assert!(first.next_frame().await.is_none());
        assert_eq!(broadcaster.registry().connection_count("u1"), 1);
    }
}
