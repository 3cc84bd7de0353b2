//! Active rooms: creation, input routing, teardown and result hand-off

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::store::ResultRecorder;
use crate::ws::hub::Transport;
use crate::ws::protocol::{ConnectionId, Direction, SpeedTier};

use super::room::{GameResult, Room, RoomCommand, RoomHandle, RoomState};
use super::MatchedPair;

/// Registry of all active rooms
pub struct SessionManager {
    rooms: DashMap<Uuid, RoomHandle>,
    /// Connection -> room it plays in
    by_connection: DashMap<ConnectionId, Uuid>,
    transport: Arc<dyn Transport>,
    recorder: ResultRecorder,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, recorder: ResultRecorder) -> Self {
        Self {
            rooms: DashMap::new(),
            by_connection: DashMap::new(),
            transport,
            recorder,
        }
    }

    /// Build a room for a matched pair and start its tick loop
    pub fn create_room(self: &Arc<Self>, pair: MatchedPair, tier: SpeedTier) -> Uuid {
        let room_id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        self.spawn_room(RoomState::new(room_id, pair, tier, seed))
    }

    pub(crate) fn spawn_room(self: &Arc<Self>, state: RoomState) -> Uuid {
        let (room, handle) = Room::new(state, self.transport.clone());
        let room_id = handle.id;

        // Register before the task starts so input can be routed immediately
        for connection in handle.connections {
            self.by_connection.insert(connection, room_id);
        }
        self.rooms.insert(room_id, handle);

        info!(room_id = %room_id, active_rooms = self.rooms.len(), "Created new room");

        let sessions = self.clone();
        tokio::spawn(async move {
            let result = room.run().await;
            sessions.finish(room_id, result).await;
        });

        room_id
    }

    /// Forward a key press to the room of `connection`
    ///
    /// Returns false when the connection has no active room.
    pub fn route_key_press(&self, connection: ConnectionId, direction: Direction) -> bool {
        let Some(handle) = self.handle_for(connection) else {
            return false;
        };

        match handle
            .command_tx
            .try_send(RoomCommand::KeyPress { connection, direction })
        {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(room_id = %handle.id, conn = %connection, "Room input backlog full, dropping key press");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(room_id = %handle.id, conn = %connection, "Key press for finished room");
            }
        }
        true
    }

    /// End the room of `connection` by forfeit
    ///
    /// Returns the result when the connection was playing; `None` when it had
    /// no room or the room already finished. A second call for the same
    /// connection is a no-op.
    pub async fn on_disconnect(&self, connection: ConnectionId) -> Option<GameResult> {
        let handle = self.handle_for(connection)?;
        let room_id = handle.id;

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = handle
            .command_tx
            .send(RoomCommand::Forfeit {
                connection,
                reply: reply_tx,
            })
            .await;

        let result = match sent {
            Ok(()) => reply_rx.await.ok().flatten(),
            Err(_) => None,
        };

        // The room task has stopped ticking once it replied
        self.detach(room_id);

        if result.is_some() {
            info!(room_id = %room_id, conn = %connection, "Player forfeited");
        }
        result
    }

    /// Called once per room after its tick loop returned
    async fn finish(&self, room_id: Uuid, result: Option<GameResult>) {
        self.detach(room_id);
        info!(room_id = %room_id, active_rooms = self.rooms.len(), "Room removed from registry");

        let Some(result) = result else {
            return;
        };

        if let Err(e) = self.recorder.record(&result).await {
            error!(room_id = %room_id, error = %e, "Failed to persist game result");
        }
    }

    fn detach(&self, room_id: Uuid) {
        if let Some((_, handle)) = self.rooms.remove(&room_id) {
            for connection in handle.connections {
                self.by_connection.remove_if(&connection, |_, id| *id == room_id);
            }
        }
    }

    fn handle_for(&self, connection: ConnectionId) -> Option<RoomHandle> {
        let room_id = self.by_connection.get(&connection).map(|r| *r)?;
        self.rooms.get(&room_id).map(|h| h.value().clone())
    }

    pub fn contains_connection(&self, connection: ConnectionId) -> bool {
        self.by_connection.contains_key(&connection)
    }

    pub fn room_of(&self, connection: ConnectionId) -> Option<Uuid> {
        self.by_connection.get(&connection).map(|r| *r)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::game::physics::Ball;
    use crate::game::room::SCORE_LIMIT;
    use crate::game::{MatchEnding, PlayerSeat, RoomPhase};
    use crate::testing::{MemoryRecordStore, RecordingTransport};
    use crate::ws::protocol::ServerMsg;

    struct Fixture {
        sessions: Arc<SessionManager>,
        transport: Arc<RecordingTransport>,
        store: Arc<MemoryRecordStore>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(RecordingTransport::default());
        let store = Arc::new(MemoryRecordStore::default());
        let recorder = ResultRecorder::new(store.clone(), 1);
        let sessions = Arc::new(SessionManager::new(transport.clone(), recorder));
        Fixture {
            sessions,
            transport,
            store,
        }
    }

    fn pair() -> MatchedPair {
        MatchedPair {
            a: PlayerSeat {
                connection: ConnectionId::new(),
                user_id: Uuid::new_v4(),
            },
            b: PlayerSeat {
                connection: ConnectionId::new(),
                user_id: Uuid::new_v4(),
            },
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn create_room_registers_both_connections() {
        let fx = fixture();
        let pair = pair();
        let room_id = fx.sessions.create_room(pair, SpeedTier::Medium);

        assert_eq!(fx.sessions.active_rooms(), 1);
        assert_eq!(fx.sessions.room_of(pair.a.connection), Some(room_id));
        assert_eq!(fx.sessions.room_of(pair.b.connection), Some(room_id));

        settle().await;
        let opening = fx.transport.messages_for(pair.b.connection);
        assert_eq!(opening.first(), Some(&ServerMsg::NewScore { this: 0, other: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn key_press_is_routed_to_the_room() {
        let fx = fixture();
        let pair = pair();
        fx.sessions.create_room(pair, SpeedTier::Slow);

        assert!(fx.sessions.route_key_press(pair.a.connection, Direction::Down));
        settle().await;

        assert!(fx
            .transport
            .messages_for(pair.a.connection)
            .contains(&ServerMsg::MyPosition { y: 55.0 }));
        assert!(fx
            .transport
            .messages_for(pair.b.connection)
            .contains(&ServerMsg::PlayerPosition { y: 55.0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn key_press_without_room_is_not_found() {
        let fx = fixture();
        assert!(!fx.sessions.route_key_press(ConnectionId::new(), Direction::Up));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_forfeits_exactly_once() {
        let fx = fixture();
        let pair = pair();
        fx.sessions.create_room(pair, SpeedTier::Fast);
        settle().await;

        let result = fx
            .sessions
            .on_disconnect(pair.a.connection)
            .await
            .expect("connection was in a room");
        assert_eq!(result.winner_id, pair.b.user_id);
        assert_eq!(result.ending, MatchEnding::Forfeit { by: pair.a.user_id });
        assert_eq!(fx.sessions.active_rooms(), 0);
        assert!(!fx.sessions.contains_connection(pair.b.connection));

        assert!(fx
            .transport
            .messages_for(pair.b.connection)
            .contains(&ServerMsg::EndGamePlayerQuit));
        assert!(fx.transport.was_closed(pair.b.connection));

        assert!(fx.sessions.on_disconnect(pair.a.connection).await.is_none());
        assert!(fx.sessions.on_disconnect(pair.b.connection).await.is_none());

        settle().await;
        assert_eq!(fx.store.saved(), vec![result]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_connection_disconnect_returns_none() {
        let fx = fixture();
        assert!(fx.sessions.on_disconnect(ConnectionId::new()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn winning_point_persists_result_and_removes_room() {
        let fx = fixture();
        let pair = pair();

        let mut state = RoomState::new(Uuid::new_v4(), pair, SpeedTier::Fast, 5);
        state.phase = RoomPhase::Running;
        state.countdown_remaining = 0;
        state.player_a.score = SCORE_LIMIT - 1;
        state.player_b.paddle_y = 10.0;
        state.ball = Ball { x: 99.5, y: 90.0, vx: 1.0, vy: 0.0 };
        fx.sessions.spawn_room(state);

        settle().await;

        let saved = fx.store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].player_a_id, pair.a.user_id);
        assert_eq!(saved[0].player_b_id, pair.b.user_id);
        assert_eq!((saved[0].score_a, saved[0].score_b), (5, 0));
        assert_eq!(fx.sessions.active_rooms(), 0);
        assert!(fx.transport.was_closed(pair.b.connection));

        // Late disconnects after the room is gone do nothing
        assert!(fx.sessions.on_disconnect(pair.b.connection).await.is_none());
        settle().await;
        assert_eq!(fx.store.saved().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rooms_are_independent() {
        let fx = fixture();
        let first = pair();
        let second = pair();
        fx.sessions.create_room(first, SpeedTier::Slow);
        fx.sessions.create_room(second, SpeedTier::Fast);
        settle().await;

        fx.sessions.on_disconnect(first.b.connection).await;
        assert_eq!(fx.sessions.active_rooms(), 1);
        assert!(fx.sessions.contains_connection(second.a.connection));
        assert!(fx.sessions.route_key_press(second.b.connection, Direction::Up));
    }
}
