//! Game simulation modules

pub mod physics;
pub mod room;
pub mod sessions;

pub use room::{GameResult, MatchEnding, Room, RoomHandle, RoomPhase, RoomState};
pub use sessions::SessionManager;

use uuid::Uuid;

use crate::ws::protocol::ConnectionId;

/// One side of a freshly formed match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSeat {
    pub connection: ConnectionId,
    pub user_id: Uuid,
}

/// Two players about to share a room; `a` plays on the left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub a: PlayerSeat,
    pub b: PlayerSeat,
}
