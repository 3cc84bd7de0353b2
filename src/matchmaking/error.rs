//! Matchmaking errors

use crate::ws::protocol::UnknownSpeedTier;

/// Reasons a lobby request is rejected; the message is sent as `error{reason}`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchmakingError {
    #[error(transparent)]
    InvalidSpeedTier(#[from] UnknownSpeedTier),

    #[error("No speed tier selected")]
    MissingSpeedTier,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("User already has an active connection")]
    AlreadyConnected,

    #[error("Connection is not active")]
    InactiveConnection,

    #[error("Already in a match")]
    AlreadyInMatch,

    #[error("Cannot invite yourself")]
    SelfInvite,

    #[error("Invitation not found")]
    InvitationNotFound,
}

impl MatchmakingError {
    /// Whether the connection is closed after the error is sent
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            MatchmakingError::Unauthorized | MatchmakingError::AlreadyConnected
        )
    }
}
