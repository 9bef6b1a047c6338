//! Client side subscription that survives dropped connections.
//!
//! A single driver task owns the connection. It reconnects after a failure
//! with linear backoff (`base_interval * attempt`), resuming from the last
//! event it delivered, and gives up after `max_attempts` consecutive
//! failures until [`ClientReconnector::reconnect`] is called. There is never
//! more than one connection attempt in flight.
use crate::connector::{Connector, FrameStream, SubscribeRequest};
use crate::frame::ServerFrame;
use events::{EventId, RealtimeEvent};
use futures_util::StreamExt;
use log::*;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub base_interval: Duration,
    pub max_attempts: u32,
}

impl ReconnectConfig {
    /// Delay before reconnection attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_interval * attempt
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_interval: DEFAULT_BASE_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Connected; the server is replaying missed events.
    Replaying,
    Live,
    /// Waiting before reconnection attempt `attempt`.
    Backoff { attempt: u32 },
    /// Retries exhausted; only a manual reconnect leaves this state.
    Failed,
    /// Disconnected on request. Terminal.
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Replaying | ConnectionState::Live)
    }
}

#[derive(Debug)]
enum Command {
    Reconnect,
    Disconnect,
}

pub struct ClientReconnector {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    last_event: watch::Receiver<Option<RealtimeEvent>>,
    events: mpsc::UnboundedReceiver<RealtimeEvent>,
    driver: JoinHandle<()>,
}

impl ClientReconnector {
    /// Starts connecting in the background. Must be called from within a
    /// tokio runtime.
    pub fn connect<C: Connector>(
        connector: C,
        request: SubscribeRequest,
        config: ReconnectConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (last_event_tx, last_event_rx) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let last_delivered = request
            .last_event_id
            .as_deref()
            .and_then(|id| id.parse::<EventId>().ok());

        let driver = Driver {
            connector,
            request,
            config,
            commands: commands_rx,
            state: state_tx,
            last_event: last_event_tx,
            events: events_tx,
            last_delivered,
        };

        Self {
            commands: commands_tx,
            state: state_rx,
            last_event: last_event_rx,
            events: events_rx,
            driver: tokio::spawn(driver.run()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change, for callers that want to
    /// react to transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The most recent event delivered to this client.
    pub fn last_event(&self) -> Option<RealtimeEvent> {
        self.last_event.borrow().clone()
    }

    /// Next event in delivery order. Returns `None` once the client is closed
    /// and every delivered event has been consumed.
    pub async fn next_event(&mut self) -> Option<RealtimeEvent> {
        self.events.recv().await
    }

    /// Drops the current connection, if any, and connects again immediately
    /// with a fresh attempt budget.
    pub fn reconnect(&self) {
        if self.commands.send(Command::Reconnect).is_err() {
            debug!("Reconnect requested after the client was closed");
        }
    }

    /// Closes the connection and cancels any pending retry. Terminal.
    pub fn disconnect(&self) {
        if self.commands.send(Command::Disconnect).is_err() {
            debug!("Disconnect requested after the client was closed");
        }
    }
}

impl Drop for ClientReconnector {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// How one connection ended.
enum Outcome {
    Dropped { established: bool },
    Reconnect,
    Disconnect,
}

fn on_command(command: Option<Command>) -> Outcome {
    match command {
        Some(Command::Reconnect) => Outcome::Reconnect,
        // All handles gone means nobody can observe this client any more.
        Some(Command::Disconnect) | None => Outcome::Disconnect,
    }
}

struct Driver<C> {
    connector: C,
    request: SubscribeRequest,
    config: ReconnectConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    last_event: watch::Sender<Option<RealtimeEvent>>,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    last_delivered: Option<EventId>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            match self.connect_once().await {
                Outcome::Disconnect => break,
                Outcome::Reconnect => {
                    attempt = 0;
                    continue;
                }
                Outcome::Dropped { established } => {
                    if established {
                        attempt = 0;
                    }
                }
            }

            attempt += 1;
            if attempt > self.config.max_attempts {
                warn!(
                    "Giving up after {} reconnection attempt(s)",
                    self.config.max_attempts
                );
                self.set_state(ConnectionState::Failed);
                match on_command(self.commands.recv().await) {
                    Outcome::Reconnect => {
                        attempt = 0;
                        continue;
                    }
                    _ => break,
                }
            }

            let delay = self.config.backoff(attempt);
            info!("Reconnecting in {delay:?} (attempt {attempt})");
            self.set_state(ConnectionState::Backoff { attempt });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                command = self.commands.recv() => match on_command(command) {
                    Outcome::Reconnect => attempt = 0,
                    _ => break,
                },
            }
        }

        self.set_state(ConnectionState::Closed);
        debug!("Client for user {} closed", self.request.user_id);
    }

    async fn connect_once(&mut self) -> Outcome {
        self.set_state(ConnectionState::Connecting);

        let mut request = self.request.clone();
        if let Some(last) = self.last_delivered {
            request.last_event_id = Some(last.to_string());
        }

        let opened = tokio::select! {
            opened = self.connector.open(&request) => opened,
            command = self.commands.recv() => return on_command(command),
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to open stream: {e}");
                return Outcome::Dropped { established: false };
            }
        };

        self.consume(stream).await
    }

    async fn consume(&mut self, mut stream: FrameStream) -> Outcome {
        let mut established = false;
        let mut replay_remaining = 0usize;

        loop {
            let item = tokio::select! {
                item = stream.next() => item,
                command = self.commands.recv() => return on_command(command),
            };

            let data = match item {
                Some(Ok(data)) => data,
                Some(Err(e)) => {
                    warn!("Connection error: {e}");
                    return Outcome::Dropped { established };
                }
                None => {
                    info!("Stream ended by the server");
                    return Outcome::Dropped { established };
                }
            };

            match ServerFrame::parse(&data) {
                Ok(ServerFrame::Connected { replay_count }) => {
                    established = true;
                    replay_remaining = replay_count;
                    info!("Connected, {replay_count} event(s) to replay");
                    self.set_state(if replay_count > 0 {
                        ConnectionState::Replaying
                    } else {
                        ConnectionState::Live
                    });
                }
                Ok(ServerFrame::Event(event)) => {
                    self.deliver(event);
                    if replay_remaining > 0 {
                        replay_remaining -= 1;
                        if replay_remaining == 0 {
                            self.set_state(ConnectionState::Live);
                        }
                    }
                }
                Err(e) => warn!("Ignoring unparseable frame: {e}"),
            }
        }
    }

    fn deliver(&mut self, event: RealtimeEvent) {
        if self.last_delivered.is_some_and(|last| event.id <= last) {
            debug!("Skipping already delivered event {}", event.id);
            return;
        }
        self.last_delivered = Some(event.id);
        self.last_event.send_replace(Some(event.clone()));
        // The receiving half lives in the handle; if it is gone so is the driver.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            trace!("Client state {current:?} -> {state:?}");
            *current = state;
            true
        });
    }
}
