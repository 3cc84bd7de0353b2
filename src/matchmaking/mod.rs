//! Queue, invitations and the lobby entry point

pub mod error;
pub mod invites;
pub mod queue;
pub mod service;

pub use error::MatchmakingError;
pub use invites::{Invitation, InvitationRegistry};
pub use queue::{MatchmakingQueue, QueueTicket};
pub use service::MatchmakingService;
