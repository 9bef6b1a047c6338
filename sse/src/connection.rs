use crate::message::EventFrame;
use dashmap::DashMap;
use events::{EventTypeSet, UserId};
use log::*;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub user_id: UserId,
    pub filter: EventTypeSet,
    pub sender: Sender<EventFrame>,
}

/// Outcome of one fan-out to a user's connections.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub evicted: usize,
}

/// Connection registry with dual indices for O(1) lookups.
///
/// The registry is the single source of truth for whether a connection is
/// still deliverable: a connection whose channel is closed or full is
/// removed on the next write attempt.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for registration/cleanup - O(1)
    connections: DashMap<ConnectionId, ConnectionInfo>,

    /// Secondary index: fast lookup by user_id for message routing - O(1)
    user_index: DashMap<UserId, HashSet<ConnectionId>>,

    buffer: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CONNECTION_BUFFER)
    }

    /// `buffer` bounds how many frames may queue for a connection before it
    /// is considered stalled and evicted.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Creates a channel sized by this registry and registers its sending half.
    pub fn open_channel(
        self: &Arc<Self>,
        user_id: UserId,
        filter: EventTypeSet,
    ) -> (ConnectionHandle, Receiver<EventFrame>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        (self.add_connection(user_id, filter, tx), rx)
    }

    /// Register an outbound channel - O(1). Dropping or cancelling the
    /// returned handle removes exactly this channel.
    pub fn add_connection(
        self: &Arc<Self>,
        user_id: UserId,
        filter: EventTypeSet,
        sender: Sender<EventFrame>,
    ) -> ConnectionHandle {
        let connection_id = ConnectionId::new();

        self.connections.insert(
            connection_id.clone(),
            ConnectionInfo {
                user_id: user_id.clone(),
                filter,
                sender,
            },
        );

        self.user_index
            .entry(user_id.clone())
            .or_default()
            .insert(connection_id.clone());

        debug!(
            "Registered connection {} for user {user_id}",
            connection_id.as_str()
        );

        ConnectionHandle {
            id: connection_id,
            registry: Arc::downgrade(self),
            released: false,
        }
    }

    /// Unregister a connection - O(1). Unknown ids are ignored.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let Some((_, info)) = self.connections.remove(connection_id) else {
            return false;
        };
        let user_id = info.user_id;

        if let Some(mut entry) = self.user_index.get_mut(&user_id) {
            entry.remove(connection_id);

            if entry.is_empty() {
                drop(entry); // Release lock before removal
                self.user_index
                    .remove_if(&user_id, |_, connections| connections.is_empty());
            }
        }

        debug!(
            "Unregistered connection {} for user {user_id}",
            connection_id.as_str()
        );
        true
    }

    /// Fan a frame out to every connection of `user_id` whose filter admits
    /// it. Writes never block: a closed or full channel is evicted.
    ///
    /// The user's index entry stays read-locked while writing, so a
    /// concurrent registration or removal for the same user waits for the
    /// fan-out to finish rather than racing it.
    pub fn broadcast(&self, user_id: &str, frame: &EventFrame) -> Delivery {
        let mut delivery = Delivery::default();
        let mut stale = Vec::new();

        if let Some(connection_ids) = self.user_index.get(user_id) {
            for conn_id in connection_ids.iter() {
                let Some(info) = self.connections.get(conn_id) else {
                    continue;
                };
                if !info.filter.matches(frame.event_type) {
                    continue;
                }

                match info.sender.try_send(frame.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            "Connection {} is not keeping up, evicting it",
                            conn_id.as_str()
                        );
                        stale.push(conn_id.clone());
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Connection {} is closed, evicting it", conn_id.as_str());
                        stale.push(conn_id.clone());
                    }
                }
            }
        }

        for conn_id in stale {
            if self.unregister(&conn_id) {
                delivery.evicted += 1;
            }
        }

        delivery
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.user_index
            .get(user_id)
            .map(|connections| connections.len())
            .unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }

    /// Drops every registered channel, which ends all open streams.
    pub fn close_all(&self) {
        let count = self.connections.len();
        self.user_index.clear();
        self.connections.clear();
        info!("Closed {count} connection(s)");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle for one registered connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    registry: Weak<ConnectionRegistry>,
    released: bool,
}

impl ConnectionHandle {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.id);
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.release();
    }
}
