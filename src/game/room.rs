//! Room state and authoritative tick loop

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::{tick_duration, COUNTDOWN_STEP_TICKS, COUNTDOWN_TICKS, SERVE_PAUSE_TICKS};
use crate::ws::hub::{Dispatch, Transport};
use crate::ws::protocol::{ConnectionId, DelayValue, Direction, ServerMsg, SpeedTier};

use super::physics::{Ball, PhysicsSystem, Side, StepOutcome, TierStats, TABLE_CENTER};
use super::MatchedPair;

/// Points needed to win a match
pub const SCORE_LIMIT: u32 = 5;

/// Room phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Counting down before a serve, physics paused
    Countdown,
    /// Ball in play
    Running,
    /// Match over, terminal
    Finished,
}

/// One player's authoritative state inside a room
#[derive(Debug, Clone)]
pub struct PlayerEndpoint {
    pub connection: ConnectionId,
    pub user_id: Uuid,
    pub score: u32,
    pub paddle_y: f32,
}

impl PlayerEndpoint {
    fn new(connection: ConnectionId, user_id: Uuid) -> Self {
        Self {
            connection,
            user_id,
            score: 0,
            paddle_y: TABLE_CENTER,
        }
    }
}

/// How a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEnding {
    /// A player reached the score limit
    ScoreLimit,
    /// The given user disconnected and lost by forfeit
    Forfeit { by: Uuid },
}

/// Final outcome of a room, handed to the record store exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub room_id: Uuid,
    pub player_a_id: Uuid,
    pub player_b_id: Uuid,
    pub score_a: u32,
    pub score_b: u32,
    pub winner_id: Uuid,
    pub ending: MatchEnding,
}

impl GameResult {
    pub fn loser_id(&self) -> Uuid {
        if self.winner_id == self.player_a_id {
            self.player_b_id
        } else {
            self.player_a_id
        }
    }
}

/// Messages and completion produced by one tick
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub dispatches: Vec<Dispatch>,
    pub finished: Option<GameResult>,
}

/// Room state (owned by the room task)
pub struct RoomState {
    pub id: Uuid,
    pub tier: SpeedTier,
    pub phase: RoomPhase,
    pub tick: u64,
    pub player_a: PlayerEndpoint,
    pub player_b: PlayerEndpoint,
    pub ball: Ball,
    pub countdown_remaining: u32,
    ball_speed: f32,
    rng: ChaCha8Rng,
}

impl RoomState {
    pub fn new(id: Uuid, pair: MatchedPair, tier: SpeedTier, seed: u64) -> Self {
        let ball_speed = TierStats::for_tier(tier).ball_speed;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let ball = Ball::serve(ball_speed, &mut rng);

        Self {
            id,
            tier,
            phase: RoomPhase::Countdown,
            tick: 0,
            player_a: PlayerEndpoint::new(pair.a.connection, pair.a.user_id),
            player_b: PlayerEndpoint::new(pair.b.connection, pair.b.user_id),
            ball,
            countdown_remaining: COUNTDOWN_TICKS,
            ball_speed,
            rng,
        }
    }

    pub fn endpoint(&self, side: Side) -> &PlayerEndpoint {
        match side {
            Side::Left => &self.player_a,
            Side::Right => &self.player_b,
        }
    }

    fn endpoint_mut(&mut self, side: Side) -> &mut PlayerEndpoint {
        match side {
            Side::Left => &mut self.player_a,
            Side::Right => &mut self.player_b,
        }
    }

    /// Which side the connection plays on, if it belongs to this room
    pub fn side_of(&self, connection: ConnectionId) -> Option<Side> {
        if self.player_a.connection == connection {
            Some(Side::Left)
        } else if self.player_b.connection == connection {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Messages sent as soon as the room exists
    pub fn opening_messages(&self) -> Vec<Dispatch> {
        self.score_messages()
    }

    /// Advance the room by one tick
    pub fn tick(&mut self) -> TickOutcome {
        self.tick += 1;

        match self.phase {
            RoomPhase::Countdown => TickOutcome {
                dispatches: self.countdown_tick(),
                finished: None,
            },
            RoomPhase::Running => self.running_tick(),
            RoomPhase::Finished => TickOutcome::default(),
        }
    }

    fn countdown_tick(&mut self) -> Vec<Dispatch> {
        let mut out = Vec::new();

        if self.countdown_remaining > 0 && self.countdown_remaining % COUNTDOWN_STEP_TICKS == 0 {
            let value = DelayValue::Count(self.countdown_remaining / COUNTDOWN_STEP_TICKS);
            self.broadcast(&mut out, ServerMsg::Delay { value });
        }

        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining == 0 {
            self.phase = RoomPhase::Running;
            self.broadcast(&mut out, ServerMsg::Delay { value: DelayValue::start() });
        }

        out
    }

    fn running_tick(&mut self) -> TickOutcome {
        let outcome = PhysicsSystem::step(
            &mut self.ball,
            self.player_a.paddle_y,
            self.player_b.paddle_y,
            self.ball_speed,
        );

        match outcome {
            StepOutcome::InPlay => TickOutcome {
                dispatches: self.frame_messages(),
                finished: None,
            },
            StepOutcome::Scored(side) => self.register_point(side),
        }
    }

    fn register_point(&mut self, side: Side) -> TickOutcome {
        self.endpoint_mut(side).score += 1;
        let mut dispatches = self.score_messages();

        debug!(
            room_id = %self.id,
            score_a = self.player_a.score,
            score_b = self.player_b.score,
            "Point scored"
        );

        if self.endpoint(side).score >= SCORE_LIMIT {
            let winner = self.endpoint(side).clone();
            let loser = self.endpoint(side.opponent()).clone();
            self.phase = RoomPhase::Finished;

            dispatches.push(Dispatch::Send(winner.connection, ServerMsg::EndGame { won: true }));
            dispatches.push(Dispatch::Send(loser.connection, ServerMsg::EndGame { won: false }));
            dispatches.push(Dispatch::Close(loser.connection));

            return TickOutcome {
                dispatches,
                finished: Some(self.result(winner.user_id, MatchEnding::ScoreLimit)),
            };
        }

        self.ball = Ball::serve(self.ball_speed, &mut self.rng);
        self.countdown_remaining = SERVE_PAUSE_TICKS;
        self.phase = RoomPhase::Countdown;
        dispatches.extend(self.frame_messages());

        TickOutcome {
            dispatches,
            finished: None,
        }
    }

    /// Move the paddle of `connection` and echo the new position to both sides
    pub fn key_press(&mut self, connection: ConnectionId, direction: Direction) -> Vec<Dispatch> {
        if self.phase == RoomPhase::Finished {
            return Vec::new();
        }
        let Some(side) = self.side_of(connection) else {
            return Vec::new();
        };

        let player = self.endpoint_mut(side);
        let Some(paddle_y) = PhysicsSystem::move_paddle(direction, player.paddle_y) else {
            return Vec::new();
        };
        player.paddle_y = paddle_y;

        let opponent = self.endpoint(side.opponent()).connection;
        vec![
            Dispatch::Send(connection, ServerMsg::MyPosition { y: paddle_y }),
            Dispatch::Send(opponent, ServerMsg::PlayerPosition { y: paddle_y }),
        ]
    }

    /// End the match because `connection` left; the other side wins
    pub fn forfeit(&mut self, connection: ConnectionId) -> Option<(Vec<Dispatch>, GameResult)> {
        if self.phase == RoomPhase::Finished {
            return None;
        }
        let side = self.side_of(connection)?;
        self.phase = RoomPhase::Finished;

        let quitter = self.endpoint(side).user_id;
        let remaining = self.endpoint(side.opponent()).clone();
        let dispatches = vec![
            Dispatch::Send(remaining.connection, ServerMsg::EndGamePlayerQuit),
            Dispatch::Close(remaining.connection),
        ];

        Some((
            dispatches,
            self.result(remaining.user_id, MatchEnding::Forfeit { by: quitter }),
        ))
    }

    fn result(&self, winner_id: Uuid, ending: MatchEnding) -> GameResult {
        GameResult {
            room_id: self.id,
            player_a_id: self.player_a.user_id,
            player_b_id: self.player_b.user_id,
            score_a: self.player_a.score,
            score_b: self.player_b.score,
            winner_id,
            ending,
        }
    }

    fn broadcast(&self, out: &mut Vec<Dispatch>, msg: ServerMsg) {
        out.push(Dispatch::Send(self.player_a.connection, msg.clone()));
        out.push(Dispatch::Send(self.player_b.connection, msg));
    }

    /// Ball position, mirrored on x for the right-hand player
    fn frame_messages(&self) -> Vec<Dispatch> {
        vec![
            Dispatch::Send(
                self.player_a.connection,
                ServerMsg::NextFrame { x: self.ball.x, y: self.ball.y },
            ),
            Dispatch::Send(
                self.player_b.connection,
                ServerMsg::NextFrame {
                    x: PhysicsSystem::mirror_x(self.ball.x),
                    y: self.ball.y,
                },
            ),
        ]
    }

    fn score_messages(&self) -> Vec<Dispatch> {
        vec![
            Dispatch::Send(
                self.player_a.connection,
                ServerMsg::NewScore {
                    this: self.player_a.score,
                    other: self.player_b.score,
                },
            ),
            Dispatch::Send(
                self.player_b.connection,
                ServerMsg::NewScore {
                    this: self.player_b.score,
                    other: self.player_a.score,
                },
            ),
        ]
    }
}

/// Commands delivered to a running room
#[derive(Debug)]
pub enum RoomCommand {
    KeyPress {
        connection: ConnectionId,
        direction: Direction,
    },
    Forfeit {
        connection: ConnectionId,
        reply: oneshot::Sender<Option<GameResult>>,
    },
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    pub tier: SpeedTier,
    pub connections: [ConnectionId; 2],
    pub command_tx: mpsc::Sender<RoomCommand>,
}

/// The authoritative room task
pub struct Room {
    state: RoomState,
    command_rx: mpsc::Receiver<RoomCommand>,
    transport: Arc<dyn Transport>,
}

impl Room {
    /// Wrap a prepared state into a room task and its handle
    pub fn new(state: RoomState, transport: Arc<dyn Transport>) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);

        let handle = RoomHandle {
            id: state.id,
            tier: state.tier,
            connections: [state.player_a.connection, state.player_b.connection],
            command_tx,
        };

        let room = Self {
            state,
            command_rx,
            transport,
        };

        (room, handle)
    }

    /// Run the tick loop until the match finishes
    ///
    /// Ticks and commands are handled on this single task, so at most one
    /// physics step is in flight per room. Returns `None` only when every
    /// handle was dropped before the match finished.
    pub async fn run(mut self) -> Option<GameResult> {
        info!(
            room_id = %self.state.id,
            tier = %self.state.tier,
            player_a = %self.state.player_a.user_id,
            player_b = %self.state.player_b.user_id,
            "Room started"
        );

        self.transport.dispatch(self.state.opening_messages());

        let mut tick_interval = interval(tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let outcome = self.state.tick();
                    self.transport.dispatch(outcome.dispatches);

                    if let Some(result) = outcome.finished {
                        info!(
                            room_id = %self.state.id,
                            score_a = result.score_a,
                            score_b = result.score_b,
                            winner_id = %result.winner_id,
                            "Room finished"
                        );
                        return Some(result);
                    }
                }
                command = self.command_rx.recv() => match command {
                    Some(RoomCommand::KeyPress { connection, direction }) => {
                        let dispatches = self.state.key_press(connection, direction);
                        self.transport.dispatch(dispatches);
                    }
                    Some(RoomCommand::Forfeit { connection, reply }) => {
                        match self.state.forfeit(connection) {
                            Some((dispatches, result)) => {
                                self.transport.dispatch(dispatches);
                                let _ = reply.send(Some(result.clone()));
                                info!(
                                    room_id = %self.state.id,
                                    winner_id = %result.winner_id,
                                    "Room ended by forfeit"
                                );
                                return Some(result);
                            }
                            None => {
                                let _ = reply.send(None);
                            }
                        }
                    }
                    None => {
                        warn!(room_id = %self.state.id, "Room command channel closed");
                        return None;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::PlayerSeat;

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

    fn running_room(tier: SpeedTier) -> RoomState {
        let mut state = RoomState::new(Uuid::new_v4(), pair(), tier, 1);
        state.phase = RoomPhase::Running;
        state.countdown_remaining = 0;
        state
    }

    /// Put the ball one step from leaving the right edge, away from paddle B
    fn aim_past_right_paddle(state: &mut RoomState) {
        state.player_b.paddle_y = 10.0;
        state.ball = Ball { x: 99.5, y: 90.0, vx: 1.0, vy: 0.0 };
    }

    fn messages_for(dispatches: &[Dispatch], connection: ConnectionId) -> Vec<ServerMsg> {
        dispatches
            .iter()
            .filter_map(|d| match d {
                Dispatch::Send(to, msg) if *to == connection => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn countdown_broadcasts_every_step_then_start() {
        let mut state = RoomState::new(Uuid::new_v4(), pair(), SpeedTier::Medium, 3);
        let a = state.player_a.connection;
        let mut seen = Vec::new();

        for _ in 0..COUNTDOWN_TICKS {
            assert_eq!(state.phase, RoomPhase::Countdown);
            let outcome = state.tick();
            for msg in messages_for(&outcome.dispatches, a) {
                if let ServerMsg::Delay { value } = msg {
                    seen.push(value);
                }
            }
        }

        assert_eq!(
            seen,
            vec![
                DelayValue::Count(3),
                DelayValue::Count(2),
                DelayValue::Count(1),
                DelayValue::start(),
            ]
        );
        assert_eq!(state.phase, RoomPhase::Running);
    }

    #[test]
    fn ball_does_not_move_during_countdown() {
        let mut state = RoomState::new(Uuid::new_v4(), pair(), SpeedTier::Fast, 9);
        let before = state.ball;
        state.tick();
        assert_eq!(state.ball, before);
    }

    #[test]
    fn frames_are_mirrored_for_player_b() {
        let mut state = running_room(SpeedTier::Medium);
        state.ball = Ball { x: 30.0, y: 40.0, vx: 1.0, vy: 0.0 };
        let outcome = state.tick();

        let a_frames = messages_for(&outcome.dispatches, state.player_a.connection);
        let b_frames = messages_for(&outcome.dispatches, state.player_b.connection);
        assert_eq!(a_frames, vec![ServerMsg::NextFrame { x: 31.0, y: 40.0 }]);
        assert_eq!(b_frames, vec![ServerMsg::NextFrame { x: 69.0, y: 40.0 }]);
    }

    #[test]
    fn scoring_resets_ball_and_sends_mirrored_scores() {
        let mut state = running_room(SpeedTier::Medium);
        aim_past_right_paddle(&mut state);
        let outcome = state.tick();

        assert!(outcome.finished.is_none());
        assert_eq!(state.player_a.score, 1);
        assert_eq!((state.ball.x, state.ball.y), (TABLE_CENTER, TABLE_CENTER));
        assert_eq!(state.phase, RoomPhase::Countdown);
        assert_eq!(state.countdown_remaining, SERVE_PAUSE_TICKS);

        let a_msgs = messages_for(&outcome.dispatches, state.player_a.connection);
        let b_msgs = messages_for(&outcome.dispatches, state.player_b.connection);
        assert!(a_msgs.contains(&ServerMsg::NewScore { this: 1, other: 0 }));
        assert!(b_msgs.contains(&ServerMsg::NewScore { this: 0, other: 1 }));
        assert!(a_msgs.contains(&ServerMsg::NextFrame { x: TABLE_CENTER, y: TABLE_CENTER }));
    }

    #[test]
    fn five_points_finish_the_match() {
        let mut state = running_room(SpeedTier::Fast);
        let (a_user, b_user) = (state.player_a.user_id, state.player_b.user_id);
        let mut finished = None;

        for _ in 0..SCORE_LIMIT {
            state.phase = RoomPhase::Running;
            aim_past_right_paddle(&mut state);
            finished = state.tick().finished.or(finished);
        }

        let result = finished.expect("match should be finished");
        assert_eq!(result.player_a_id, a_user);
        assert_eq!(result.player_b_id, b_user);
        assert_eq!((result.score_a, result.score_b), (5, 0));
        assert_eq!(result.winner_id, a_user);
        assert_eq!(result.loser_id(), b_user);
        assert_eq!(result.ending, MatchEnding::ScoreLimit);
        assert_eq!(state.phase, RoomPhase::Finished);

        // Terminal: further ticks produce nothing
        assert!(state.tick().dispatches.is_empty());
        assert_eq!(state.player_a.score, 5);
    }

    #[test]
    fn final_point_notifies_and_closes_loser() {
        let mut state = running_room(SpeedTier::Slow);
        state.player_a.score = SCORE_LIMIT - 1;
        aim_past_right_paddle(&mut state);

        let outcome = state.tick();
        let winner = state.player_a.connection;
        let loser = state.player_b.connection;
        assert!(outcome
            .dispatches
            .contains(&Dispatch::Send(winner, ServerMsg::EndGame { won: true })));
        assert!(outcome
            .dispatches
            .contains(&Dispatch::Send(loser, ServerMsg::EndGame { won: false })));
        assert_eq!(outcome.dispatches.last(), Some(&Dispatch::Close(loser)));
    }

    #[test]
    fn key_press_updates_both_views() {
        let mut state = running_room(SpeedTier::Medium);
        let (a, b) = (state.player_a.connection, state.player_b.connection);

        let dispatches = state.key_press(b, Direction::Up);
        assert_eq!(
            dispatches,
            vec![
                Dispatch::Send(b, ServerMsg::MyPosition { y: 45.0 }),
                Dispatch::Send(a, ServerMsg::PlayerPosition { y: 45.0 }),
            ]
        );
        assert_eq!(state.player_b.paddle_y, 45.0);
    }

    #[test]
    fn key_press_from_stranger_is_ignored() {
        let mut state = running_room(SpeedTier::Medium);
        assert!(state.key_press(ConnectionId::new(), Direction::Down).is_empty());
    }

    #[test]
    fn forfeit_awards_win_to_remaining_side() {
        let mut state = running_room(SpeedTier::Medium);
        state.player_a.score = 3;
        state.player_b.score = 1;
        let (a, b) = (state.player_a.connection, state.player_b.connection);

        let (dispatches, result) = state.forfeit(a).expect("a is in the room");
        assert_eq!(
            dispatches,
            vec![Dispatch::Send(b, ServerMsg::EndGamePlayerQuit), Dispatch::Close(b)]
        );
        assert_eq!(result.winner_id, state.player_b.user_id);
        assert_eq!(result.ending, MatchEnding::Forfeit { by: state.player_a.user_id });
        assert_eq!((result.score_a, result.score_b), (3, 1));

        // Second forfeit is a no-op
        assert!(state.forfeit(a).is_none());
        assert!(state.forfeit(b).is_none());
    }
}
