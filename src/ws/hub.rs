//! Live connection registry and outbound delivery

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ws::protocol::{ConnectionId, ServerMsg, SpeedTier};

/// An outbound instruction produced by game logic
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Send(ConnectionId, ServerMsg),
    Close(ConnectionId),
}

/// Fire-and-forget delivery to a single live connection
pub trait Transport: Send + Sync {
    fn send(&self, to: ConnectionId, msg: ServerMsg);

    /// Ask the transport to close the connection after pending messages
    fn close(&self, connection: ConnectionId);

    fn dispatch(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            match dispatch {
                Dispatch::Send(to, msg) => self.send(to, msg),
                Dispatch::Close(connection) => self.close(connection),
            }
        }
    }
}

/// Social-layer notifications produced by matchmaking
pub trait Notifier: Send + Sync {
    fn send_game_invite(&self, receiver_id: Uuid, sender_id: Uuid, speed: SpeedTier);

    fn send_signal_to_start_game(&self, user_id: Uuid);
}

/// Frames a connection may have waiting for its writer; a client that falls
/// this far behind is disconnected
pub const OUTBOUND_BUFFER: usize = 256;

/// Item queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMsg),
    Close,
}

struct ConnectionEntry {
    user_id: Uuid,
    tx: mpsc::Sender<Outbound>,
}

/// All live WebSocket connections, keyed by connection handle
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection; the receiver feeds its writer task
    pub fn register(
        &self,
        connection: ConnectionId,
        user_id: Uuid,
    ) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.connections
            .insert(connection, ConnectionEntry { user_id, tx });
        rx
    }

    pub fn unregister(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queue an item for the writer without waiting
    ///
    /// A full queue drops the connection's sender: the writer drains what is
    /// queued and then ends, which tears the connection down.
    fn push(&self, connection: ConnectionId, item: Outbound) {
        let sent = match self.connections.get(&connection) {
            Some(entry) => entry.tx.try_send(item),
            None => {
                debug!(conn = %connection, "Message for unknown connection dropped");
                return;
            }
        };

        match sent {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(conn = %connection, capacity = OUTBOUND_BUFFER, "Outbound queue full, dropping slow client");
                self.connections.remove(&connection);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn = %connection, "Writer already gone, dropping message");
            }
        }
    }

    fn push_to_user(&self, user_id: Uuid, msg: ServerMsg) -> usize {
        let targets: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| *entry.key())
            .collect();

        for connection in &targets {
            self.push(*connection, Outbound::Message(msg.clone()));
        }
        targets.len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ConnectionHub {
    fn send(&self, to: ConnectionId, msg: ServerMsg) {
        self.push(to, Outbound::Message(msg));
    }

    fn close(&self, connection: ConnectionId) {
        self.push(connection, Outbound::Close);
    }
}

impl Notifier for ConnectionHub {
    fn send_game_invite(&self, receiver_id: Uuid, sender_id: Uuid, speed: SpeedTier) {
        let delivered = self.push_to_user(receiver_id, ServerMsg::GameInvite { sender_id, speed });
        if delivered == 0 {
            warn!(receiver_id = %receiver_id, sender_id = %sender_id, "Invite receiver is not connected");
        }
    }

    fn send_signal_to_start_game(&self, user_id: Uuid) {
        self.push_to_user(user_id, ServerMsg::StartGame);
    }
}
