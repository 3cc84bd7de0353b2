//! Pending player-to-player invitations

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::util::time::INVITE_TTL;
use crate::ws::protocol::{ConnectionId, SpeedTier};

/// A direct match request from one user to another
#[derive(Debug, Clone, PartialEq)]
pub struct Invitation {
    pub sender_id: Uuid,
    pub sender_connection: ConnectionId,
    pub receiver_id: Uuid,
    pub tier: SpeedTier,
    pub created_at: Instant,
    /// Receiver connection, set once the receiver acts on the invite
    pub bound_connection: Option<ConnectionId>,
}

impl Invitation {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }

    fn is_between(&self, sender_id: Uuid, receiver_id: Uuid) -> bool {
        self.sender_id == sender_id && self.receiver_id == receiver_id
    }
}

/// Invitation registry
///
/// Expiry is checked on every read; the sweep only reclaims memory.
pub struct InvitationRegistry {
    pending: Vec<Invitation>,
    ttl: Duration,
}

impl InvitationRegistry {
    pub fn new() -> Self {
        Self::with_ttl(INVITE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: Vec::new(),
            ttl,
        }
    }

    /// Store a new invitation, replacing an older one between the same users
    pub fn create_invite(
        &mut self,
        sender_id: Uuid,
        sender_connection: ConnectionId,
        receiver_id: Uuid,
        tier: SpeedTier,
        now: Instant,
    ) -> Invitation {
        self.pending.retain(|i| !i.is_between(sender_id, receiver_id));

        let invitation = Invitation {
            sender_id,
            sender_connection,
            receiver_id,
            tier,
            created_at: now,
            bound_connection: None,
        };
        self.pending.push(invitation.clone());
        invitation
    }

    /// Attach the receiver's live connection to the invitation from `sender_id`
    pub fn bind_connection(
        &mut self,
        receiver_id: Uuid,
        sender_id: Uuid,
        connection: ConnectionId,
    ) -> bool {
        match self
            .pending
            .iter_mut()
            .find(|i| i.is_between(sender_id, receiver_id))
        {
            Some(invitation) => {
                invitation.bound_connection = Some(connection);
                true
            }
            None => false,
        }
    }

    /// Consume a bound, unexpired invitation
    pub fn check_invite(&mut self, receiver_id: Uuid, sender_id: Uuid, now: Instant) -> Option<Invitation> {
        let ttl = self.ttl;
        let pos = self.pending.iter().position(|i| {
            i.is_between(sender_id, receiver_id)
                && i.bound_connection.is_some()
                && !i.is_expired(now, ttl)
        })?;
        Some(self.pending.remove(pos))
    }

    /// Drop every invitation older than the TTL; returns how many were dropped
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.pending.len();
        self.pending.retain(|i| !i.is_expired(now, ttl));
        before - self.pending.len()
    }

    /// Forget a connection: its sent invitations go, its bindings are cleared
    pub fn withdraw(&mut self, connection: ConnectionId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|i| i.sender_connection != connection);

        for invitation in &mut self.pending {
            if invitation.bound_connection == Some(connection) {
                invitation.bound_connection = None;
            }
        }
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for InvitationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
