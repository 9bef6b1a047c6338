//! Server-Sent Events (SSE) infrastructure for real-time updates.
//!
//! This crate delivers [`events::RealtimeEvent`]s to connected users and lets
//! a reconnecting client resume where it left off.
//!
//! # Architecture
//!
//! - **Multiple connections per user**: every open tab or device gets its own
//!   bounded channel; an event for a user reaches all of them.
//! - **Dual-index registry**: O(1) lookups for both connection management and
//!   user-scoped routing via separate DashMap indices.
//! - **Per-type history**: the last N events per user and event type are kept
//!   in memory and mirrored to the cache, so replay survives a restart while
//!   the cache is up.
//! - **Ordered delivery**: ids are assigned, recorded and fanned out under a
//!   per-user lock, so every connection of a user sees the same order.
//! - **Slow consumers are dropped**: a connection whose buffer is full is
//!   evicted instead of stalling the broadcast; the client reconnects and
//!   replays.
//!
//! # Message Flow
//!
//! 1. Client opens `/realtime`, optionally with `lastEventId` and `types`
//! 2. A [`StreamSession`] registers its channel in the [`ConnectionRegistry`]
//! 3. Missed events newer than `lastEventId` are replayed oldest first
//! 4. When something happens for a user, a service calls
//!    [`EventBroadcaster::broadcast_event`]:
//!    - a fresh, strictly increasing id is stamped on the event
//!    - the event is appended to the user's [`EventHistoryStore`] buffer
//!    - the encoded frame is pushed to every matching connection of the user
//! 5. Closing the stream (or dropping it) unregisters the connection
//!
//! # Example: Sending an event
//!
//! ```rust,ignore
//! use events::{EventPayload, SkillProgress};
//!
//! app_state
//!     .broadcaster
//!     .broadcast_event(&user_id, EventPayload::SkillProgress(progress))
//!     .await;
//! ```
//!
//! # Modules
//!
//! - `broadcaster`: id assignment, history recording and fan-out
//! - `connection`: ConnectionRegistry with dual-index architecture and type-safe ConnectionId
//! - `history`: bounded per-user, per-type replay buffers
//! - `message`: wire frames
//! - `session`: one streaming connection, from replay to close

pub mod broadcaster;
pub mod connection;
pub mod history;
pub mod message;
pub mod session;

pub use broadcaster::EventBroadcaster;
pub use connection::{ConnectionHandle, ConnectionId, ConnectionRegistry, Delivery};
pub use history::{EventHistoryStore, HistoryConfig};
pub use message::{EventFrame, Frame};
pub use session::{SessionState, StreamSession};
