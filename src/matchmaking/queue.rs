//! Matchmaking queue implementation

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::game::{MatchedPair, PlayerSeat};
use crate::ws::protocol::{ConnectionId, SpeedTier};

/// Player waiting in one speed tier
#[derive(Debug, Clone)]
pub struct QueueTicket {
    pub connection: ConnectionId,
    pub user_id: Uuid,
    pub tier: SpeedTier,
}

impl QueueTicket {
    pub fn new(connection: ConnectionId, user_id: Uuid, tier: SpeedTier) -> Self {
        Self {
            connection,
            user_id,
            tier,
        }
    }

    fn seat(&self) -> PlayerSeat {
        PlayerSeat {
            connection: self.connection,
            user_id: self.user_id,
        }
    }
}

/// The matchmaking queue: one FIFO per speed tier
#[derive(Default)]
pub struct MatchmakingQueue {
    tiers: HashMap<SpeedTier, VecDeque<QueueTicket>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ticket and pair off the oldest tickets of its tier
    ///
    /// An earlier ticket of the same user is dropped first (rejoin), in any
    /// tier, so one user is never paired with themselves.
    pub fn enqueue(&mut self, ticket: QueueTicket) -> Vec<MatchedPair> {
        self.remove_user(ticket.user_id);

        let tier = ticket.tier;
        let queue = self.tiers.entry(tier).or_default();
        queue.push_back(ticket);

        let mut pairs = Vec::new();
        while queue.len() >= 2 {
            let (Some(a), Some(b)) = (queue.pop_front(), queue.pop_front()) else {
                break;
            };
            pairs.push(MatchedPair {
                a: a.seat(),
                b: b.seat(),
            });
        }
        pairs
    }

    /// Remove any ticket held by `connection`
    pub fn cancel(&mut self, connection: ConnectionId) -> Option<QueueTicket> {
        self.take_where(|t| t.connection == connection)
    }

    fn remove_user(&mut self, user_id: Uuid) -> Option<QueueTicket> {
        self.take_where(|t| t.user_id == user_id)
    }

    fn take_where(&mut self, matches: impl Fn(&QueueTicket) -> bool) -> Option<QueueTicket> {
        for queue in self.tiers.values_mut() {
            if let Some(pos) = queue.iter().position(&matches) {
                return queue.remove(pos);
            }
        }
        None
    }

    /// Check if a user is waiting in any tier
    pub fn contains(&self, user_id: &Uuid) -> bool {
        self.tiers
            .values()
            .any(|q| q.iter().any(|t| &t.user_id == user_id))
    }

    /// Tickets waiting in one tier
    pub fn len(&self, tier: SpeedTier) -> usize {
        self.tiers.get(&tier).map_or(0, VecDeque::len)
    }

    pub fn total_len(&self) -> usize {
        self.tiers.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(tier: SpeedTier) -> QueueTicket {
        QueueTicket::new(ConnectionId::new(), Uuid::new_v4(), tier)
    }

    #[test]
    fn single_ticket_waits() {
        let mut queue = MatchmakingQueue::new();
        assert!(queue.enqueue(ticket(SpeedTier::Fast)).is_empty());
        assert_eq!(queue.len(SpeedTier::Fast), 1);
    }

    #[test]
    fn two_tickets_in_one_tier_are_paired_in_order() {
        let mut queue = MatchmakingQueue::new();
        let first = ticket(SpeedTier::Fast);
        let second = ticket(SpeedTier::Fast);

        queue.enqueue(first.clone());
        let pairs = queue.enqueue(second.clone());

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].a.user_id, first.user_id);
        assert_eq!(pairs[0].b.user_id, second.user_id);
        assert!(queue.is_empty());
    }

    #[test]
    fn tiers_do_not_mix() {
        let mut queue = MatchmakingQueue::new();
        assert!(queue.enqueue(ticket(SpeedTier::Slow)).is_empty());
        assert!(queue.enqueue(ticket(SpeedTier::Fast)).is_empty());
        assert_eq!(queue.total_len(), 2);

        let pairs = queue.enqueue(ticket(SpeedTier::Slow));
        assert_eq!(pairs.len(), 1);
        assert_eq!(queue.len(SpeedTier::Slow), 0);
        assert_eq!(queue.len(SpeedTier::Fast), 1);
    }

    #[test]
    fn same_user_is_never_paired_with_itself() {
        let mut queue = MatchmakingQueue::new();
        let user = Uuid::new_v4();

        let first = QueueTicket::new(ConnectionId::new(), user, SpeedTier::Medium);
        let second = QueueTicket::new(ConnectionId::new(), user, SpeedTier::Medium);
        queue.enqueue(first);
        assert!(queue.enqueue(second.clone()).is_empty());

        assert_eq!(queue.len(SpeedTier::Medium), 1);
        assert!(queue.cancel(second.connection).is_some());
        assert!(!queue.contains(&user));
    }

    #[test]
    fn rejoin_moves_ticket_to_new_tier() {
        let mut queue = MatchmakingQueue::new();
        let user = Uuid::new_v4();
        queue.enqueue(QueueTicket::new(ConnectionId::new(), user, SpeedTier::Slow));
        queue.enqueue(QueueTicket::new(ConnectionId::new(), user, SpeedTier::Fast));

        assert_eq!(queue.len(SpeedTier::Slow), 0);
        assert_eq!(queue.len(SpeedTier::Fast), 1);
    }

    #[test]
    fn cancel_removes_only_that_connection() {
        let mut queue = MatchmakingQueue::new();
        let stays = ticket(SpeedTier::Medium);
        let leaves = ticket(SpeedTier::Slow);
        queue.enqueue(stays.clone());
        queue.enqueue(leaves.clone());

        let removed = queue.cancel(leaves.connection).expect("ticket was queued");
        assert_eq!(removed.user_id, leaves.user_id);
        assert!(queue.cancel(leaves.connection).is_none());
        assert!(queue.contains(&stays.user_id));
    }
}
