//! Matchmaking service - single entry point for lobby and game events

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::{GameResult, MatchedPair, PlayerSeat, SessionManager};
use crate::util::time::INVITE_SWEEP_INTERVAL;
use crate::ws::hub::{Notifier, Transport};
use crate::ws::protocol::{ClientMsg, ConnectionId, DelayValue, Direction, ServerMsg, SpeedTier};

use super::error::MatchmakingError;
use super::invites::InvitationRegistry;
use super::queue::{MatchmakingQueue, QueueTicket};

const WAIT_FOR_PAIR: &str = "Wait for pair...";

/// Where a pair came from; broken queue pairs re-queue their survivor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairSource {
    Queue,
    Invite,
}

/// The one live connection a user plays through
#[derive(Debug, Clone, Copy)]
struct ActiveConnection {
    connection: ConnectionId,
    preferred_tier: Option<SpeedTier>,
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: Mutex<MatchmakingQueue>,
    invites: parking_lot::Mutex<InvitationRegistry>,
    sessions: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    /// User -> active connection
    connected: DashMap<Uuid, ActiveConnection>,
}

impl MatchmakingService {
    pub fn new(
        sessions: Arc<SessionManager>,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            invites: parking_lot::Mutex::new(InvitationRegistry::new()),
            sessions,
            transport,
            notifier,
            connected: DashMap::new(),
        }
    }

    /// Register a connection; a user may only have one at a time
    pub fn on_connect(&self, connection: ConnectionId, user_id: Uuid) -> Result<(), MatchmakingError> {
        match self.connected.entry(user_id) {
            Entry::Occupied(_) => {
                warn!(user_id = %user_id, conn = %connection, "Rejecting second connection for user");
                Err(MatchmakingError::AlreadyConnected)
            }
            Entry::Vacant(slot) => {
                slot.insert(ActiveConnection {
                    connection,
                    preferred_tier: None,
                });
                info!(user_id = %user_id, conn = %connection, "Player connected");
                Ok(())
            }
        }
    }

    /// Dispatch one inbound message, answering failures with an error event
    pub async fn handle(&self, connection: ConnectionId, user_id: Uuid, msg: ClientMsg) {
        let result = match msg {
            ClientMsg::JoinQueue { speed } => {
                self.on_join_queue(connection, user_id, speed.as_deref()).await
            }
            ClientMsg::GameSpeed { speed } => self.on_speed_select(connection, user_id, &speed),
            ClientMsg::SendInvite { receiver_id, speed } => {
                self.on_send_invite(connection, user_id, receiver_id, speed.as_deref())
            }
            ClientMsg::AcceptInvite { sender_id } => {
                self.on_accept_invite(connection, user_id, sender_id).await
            }
            ClientMsg::KeyPressed { direction } => {
                self.on_key_press(connection, direction);
                Ok(())
            }
        };

        if let Err(e) = result {
            self.reject(connection, &e);
        }
    }

    /// Send `error` to the connection and close it when the error demands
    pub fn reject(&self, connection: ConnectionId, error: &MatchmakingError) {
        debug!(conn = %connection, error = %error, "Request rejected");
        self.transport.send(
            connection,
            ServerMsg::Error {
                reason: error.to_string(),
            },
        );
        if error.closes_connection() {
            self.transport.close(connection);
        }
    }

    /// Remember the tier used when a request names none
    pub fn on_speed_select(
        &self,
        connection: ConnectionId,
        user_id: Uuid,
        speed: &str,
    ) -> Result<(), MatchmakingError> {
        let tier: SpeedTier = speed.parse()?;

        match self.connected.get_mut(&user_id) {
            Some(mut active) if active.connection == connection => {
                active.preferred_tier = Some(tier);
                debug!(user_id = %user_id, tier = %tier, "Speed tier selected");
                Ok(())
            }
            _ => Err(MatchmakingError::InactiveConnection),
        }
    }

    /// Join the queue of a tier, starting every match that forms
    pub async fn on_join_queue(
        &self,
        connection: ConnectionId,
        user_id: Uuid,
        speed: Option<&str>,
    ) -> Result<(), MatchmakingError> {
        let preferred = self.active_tier(connection, user_id)?;
        let tier = resolve_tier(speed, preferred)?;

        if self.sessions.contains_connection(connection) {
            return Err(MatchmakingError::AlreadyInMatch);
        }

        let mut queue = self.queue.lock().await;
        // The connection may have dropped or been seated while waiting for the lock
        self.active_tier(connection, user_id)?;
        if self.sessions.contains_connection(connection) {
            return Err(MatchmakingError::AlreadyInMatch);
        }

        let pairs = queue.enqueue(QueueTicket::new(connection, user_id, tier));
        info!(user_id = %user_id, tier = %tier, waiting = queue.len(tier), "Player joined matchmaking queue");

        self.transport.send(
            connection,
            ServerMsg::Delay {
                value: DelayValue::Notice(WAIT_FOR_PAIR.to_string()),
            },
        );

        self.open_rooms(&mut queue, pairs, tier, PairSource::Queue);
        Ok(())
    }

    /// Create an invitation and notify the receiver
    pub fn on_send_invite(
        &self,
        connection: ConnectionId,
        user_id: Uuid,
        receiver_id: Uuid,
        speed: Option<&str>,
    ) -> Result<(), MatchmakingError> {
        let preferred = self.active_tier(connection, user_id)?;
        let tier = resolve_tier(speed, preferred)?;

        if receiver_id == user_id {
            return Err(MatchmakingError::SelfInvite);
        }
        if self.sessions.contains_connection(connection) {
            return Err(MatchmakingError::AlreadyInMatch);
        }

        self.invites
            .lock()
            .create_invite(user_id, connection, receiver_id, tier, Instant::now());
        self.notifier.send_game_invite(receiver_id, user_id, tier);

        info!(sender_id = %user_id, receiver_id = %receiver_id, tier = %tier, "Invitation sent");
        Ok(())
    }

    /// Bind and consume the invitation from `sender_id`, then start the match
    pub async fn on_accept_invite(
        &self,
        connection: ConnectionId,
        user_id: Uuid,
        sender_id: Uuid,
    ) -> Result<(), MatchmakingError> {
        self.active_tier(connection, user_id)?;
        if self.sessions.contains_connection(connection) {
            return Err(MatchmakingError::AlreadyInMatch);
        }

        let invitation = {
            let mut invites = self.invites.lock();
            invites.bind_connection(user_id, sender_id, connection);
            invites.check_invite(user_id, sender_id, Instant::now())
        }
        .ok_or(MatchmakingError::InvitationNotFound)?;

        let pair = MatchedPair {
            a: PlayerSeat {
                connection: invitation.sender_connection,
                user_id: sender_id,
            },
            b: PlayerSeat { connection, user_id },
        };

        // Both sides are re-checked under the queue lock; the sender must
        // still be on the connection that sent the invitation
        let started = {
            let mut queue = self.queue.lock().await;
            self.open_rooms(&mut queue, vec![pair], invitation.tier, PairSource::Invite)
        };
        if started == 0 {
            return Err(MatchmakingError::InvitationNotFound);
        }

        self.notifier.send_signal_to_start_game(sender_id);
        Ok(())
    }

    pub fn on_key_press(&self, connection: ConnectionId, direction: Direction) {
        if !self.sessions.route_key_press(connection, direction) {
            debug!(conn = %connection, "Key press without active room ignored");
        }
    }

    /// Tear down whatever the connection was part of
    ///
    /// Returns the forfeit result when the connection was in a room.
    pub async fn on_disconnect(&self, connection: ConnectionId, user_id: Uuid) -> Option<GameResult> {
        // Under the queue lock so no room can open for this connection afterwards
        let cancelled = {
            let mut queue = self.queue.lock().await;
            self.connected
                .remove_if(&user_id, |_, active| active.connection == connection);
            queue.cancel(connection).is_some()
        };
        if cancelled {
            debug!(user_id = %user_id, "Queue ticket cancelled");
        }

        let result = self.sessions.on_disconnect(connection).await;

        let withdrawn = self.invites.lock().withdraw(connection);
        info!(user_id = %user_id, conn = %connection, withdrawn, "Player disconnected");

        result
    }

    /// Open a room for every pair whose players can still play
    ///
    /// Runs under the queue lock, which `on_disconnect` also takes before it
    /// drops a connection, so a pair is checked and seated atomically. The
    /// surviving player of a broken queue pair goes back into the queue.
    /// Returns how many rooms were opened.
    fn open_rooms(
        &self,
        queue: &mut MatchmakingQueue,
        pairs: Vec<MatchedPair>,
        tier: SpeedTier,
        source: PairSource,
    ) -> usize {
        let mut pending: VecDeque<MatchedPair> = pairs.into();
        let mut started = 0;

        while let Some(pair) = pending.pop_front() {
            queue.cancel(pair.a.connection);
            queue.cancel(pair.b.connection);

            let (a_ready, b_ready) = (self.can_play(&pair.a), self.can_play(&pair.b));
            if !(a_ready && b_ready) {
                warn!(
                    player_a = %pair.a.user_id,
                    player_b = %pair.b.user_id,
                    a_ready,
                    b_ready,
                    "Pair dropped, a player left before the room opened"
                );
                if source == PairSource::Queue {
                    for seat in [(pair.a, a_ready), (pair.b, b_ready)]
                        .into_iter()
                        .filter_map(|(seat, ready)| ready.then_some(seat))
                    {
                        pending.extend(queue.enqueue(QueueTicket::new(
                            seat.connection,
                            seat.user_id,
                            tier,
                        )));
                    }
                }
                continue;
            }

            {
                let mut invites = self.invites.lock();
                invites.withdraw(pair.a.connection);
                invites.withdraw(pair.b.connection);
            }

            let room_id = self.sessions.create_room(pair, tier);
            started += 1;
            info!(
                room_id = %room_id,
                tier = %tier,
                player_a = %pair.a.user_id,
                player_b = %pair.b.user_id,
                "Match started"
            );
        }
        started
    }

    /// Seat is still the user's live connection and not already playing
    fn can_play(&self, seat: &PlayerSeat) -> bool {
        let live = self
            .connected
            .get(&seat.user_id)
            .is_some_and(|active| active.connection == seat.connection);
        live && !self.sessions.contains_connection(seat.connection)
    }

    /// Preferred tier of an active connection
    fn active_tier(
        &self,
        connection: ConnectionId,
        user_id: Uuid,
    ) -> Result<Option<SpeedTier>, MatchmakingError> {
        match self.connected.get(&user_id) {
            Some(active) if active.connection == connection => Ok(active.preferred_tier),
            _ => Err(MatchmakingError::InactiveConnection),
        }
    }

    /// Run the invitation sweep until the process exits
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(INVITE_SWEEP_INTERVAL);

        loop {
            interval.tick().await;
            let expired = self.sweep_invites(Instant::now());
            if expired > 0 {
                debug!(expired, "Expired invitations swept");
            }
        }
    }

    pub fn sweep_invites(&self, now: Instant) -> usize {
        self.invites.lock().sweep_expired(now)
    }

    /// Waiting tickets per tier
    pub async fn queue_sizes(&self) -> Vec<(SpeedTier, usize)> {
        let queue = self.queue.lock().await;
        SpeedTier::ALL
            .iter()
            .map(|tier| (*tier, queue.len(*tier)))
            .collect()
    }

    pub fn pending_invites(&self) -> usize {
        self.invites.lock().len()
    }

    pub fn is_connected(&self, user_id: &Uuid) -> bool {
        self.connected.contains_key(user_id)
    }
}

fn resolve_tier(
    explicit: Option<&str>,
    preferred: Option<SpeedTier>,
) -> Result<SpeedTier, MatchmakingError> {
    match explicit {
        Some(name) => Ok(name.parse()?),
        None => preferred.ok_or(MatchmakingError::MissingSpeedTier),
    }
}
