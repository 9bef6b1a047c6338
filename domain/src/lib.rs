//! Operations the web layer performs on behalf of a user: publishing typed
//! events, reading and clearing their history, and managing notifications.
//!
//! Re-exports the event model so `web` does not need to depend on `events`
//! for the types that cross its boundary.
pub use events::{
    EventId, EventPayload, EventType, EventTypeSet, NewNotification, NotificationEvent,
    RealtimeEvent, Severity, UnknownEventType, UserId,
};

pub mod error;
pub mod event;
pub mod notification;

pub use notification::{ListOptions, NotificationStore};
