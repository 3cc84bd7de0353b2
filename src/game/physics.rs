//! Ball and paddle physics on the normalized 100x100 table

use std::f32::consts::FRAC_1_SQRT_2;

use rand::Rng;

use crate::ws::protocol::{Direction, SpeedTier};

/// Table extent on both axes
pub const TABLE_SIZE: f32 = 100.0;
/// Table center on both axes
pub const TABLE_CENTER: f32 = TABLE_SIZE / 2.0;
/// Paddle travel per key press, tier-independent
pub const PADDLE_STEP: f32 = 5.0;
/// Depth of the strike zone in front of each table edge
pub const PADDLE_MARGIN: f32 = 1.5;
/// Paddle height; `paddle_y` is its center
pub const PADDLE_HEIGHT: f32 = 16.7;
pub const BALL_RADIUS: f32 = 2.1;
/// Half-cone of the deflection range mapping, in degrees
pub const MAX_BOUNCE_DEGREES: f32 = 135.0;

/// Physics constants per speed tier
#[derive(Debug, Clone, Copy)]
pub struct TierStats {
    /// Ball speed in table units per tick
    pub ball_speed: f32,
}

impl TierStats {
    pub fn for_tier(tier: SpeedTier) -> Self {
        match tier {
            SpeedTier::Slow => Self { ball_speed: 0.4 },
            SpeedTier::Medium => Self { ball_speed: 0.8 },
            SpeedTier::Fast => Self { ball_speed: 1.5 },
        }
    }
}

/// Ball position and per-tick velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Ball {
    /// A ball at the table center heading diagonally in a random direction
    pub fn serve<R: Rng + ?Sized>(speed: f32, rng: &mut R) -> Self {
        let component = speed * FRAC_1_SQRT_2;
        let vx = if rng.gen_bool(0.5) { component } else { -component };
        let vy = if rng.gen_bool(0.5) { component } else { -component };
        Self {
            x: TABLE_CENTER,
            y: TABLE_CENTER,
            vx,
            vy,
        }
    }
}

/// Table side a paddle defends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Player A, defends x = 0
    Left,
    /// Player B, defends x = 100
    Right,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Result of advancing the ball by one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Ball still on the table at the new position
    InPlay,
    /// Ball left the table; the given side scores
    Scored(Side),
}

/// Physics system for ball and paddle updates
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Paddle delta for a key press, `None` when the paddle is already at that edge
    pub fn key_pressed(direction: Direction, paddle_y: f32) -> Option<f32> {
        match direction {
            Direction::Up if paddle_y > 0.0 => Some(-PADDLE_STEP),
            Direction::Down if paddle_y < TABLE_SIZE => Some(PADDLE_STEP),
            _ => None,
        }
    }

    /// Apply a key press and clamp the paddle to the table
    pub fn move_paddle(direction: Direction, paddle_y: f32) -> Option<f32> {
        Self::key_pressed(direction, paddle_y)
            .map(|delta| (paddle_y + delta).clamp(0.0, TABLE_SIZE))
    }

    /// Linear re-mapping of `value` from one range onto another
    pub fn map_range(value: f32, from_low: f32, from_high: f32, to_low: f32, to_high: f32) -> f32 {
        let ratio = (value - from_low) / (from_high - from_low);
        ratio * (to_high - to_low) + to_low
    }

    /// Whether a ball at `ball_y` is covered by a paddle centered on `paddle_y`
    pub fn ball_in_paddle(ball_y: f32, paddle_y: f32) -> bool {
        (ball_y - paddle_y).abs() <= PADDLE_HEIGHT / 2.0 + BALL_RADIUS / 2.0
    }

    /// Deflection angle (radians) for a strike at `ball_y` on a paddle centered on `paddle_y`
    ///
    /// The offset is mapped over a range twice the paddle height, so the
    /// reachable angles stay inside the forward half-plane.
    pub fn deflection_angle(ball_y: f32, paddle_y: f32) -> f32 {
        let max = MAX_BOUNCE_DEGREES.to_radians();
        let angle = Self::map_range(ball_y - paddle_y, -PADDLE_HEIGHT, PADDLE_HEIGHT, -max, max);
        angle.clamp(-max, max)
    }

    /// New velocity after `side`'s paddle strikes the ball
    pub fn bounce_velocity(side: Side, ball_y: f32, paddle_y: f32, speed: f32) -> (f32, f32) {
        let angle = Self::deflection_angle(ball_y, paddle_y);
        let sign = match side {
            Side::Left => 1.0,
            Side::Right => -1.0,
        };
        (speed * angle.cos() * sign, speed * angle.sin())
    }

    /// Paddle side whose strike zone the ball enters this tick, if it is moving toward it
    pub fn approaching_paddle(ball: &Ball) -> Option<Side> {
        let next_x = ball.x + ball.vx;
        if ball.vx < 0.0 && next_x <= PADDLE_MARGIN {
            Some(Side::Left)
        } else if ball.vx > 0.0 && next_x >= TABLE_SIZE - PADDLE_MARGIN {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Advance the ball by one tick: paddle strike, wall reflection, then motion
    ///
    /// On `Scored` the ball is left at its out-of-table position; the caller
    /// resets it before anything is broadcast.
    pub fn step(ball: &mut Ball, left_paddle: f32, right_paddle: f32, speed: f32) -> StepOutcome {
        if let Some(side) = Self::approaching_paddle(ball) {
            let paddle_y = match side {
                Side::Left => left_paddle,
                Side::Right => right_paddle,
            };
            if Self::ball_in_paddle(ball.y, paddle_y) {
                let (vx, vy) = Self::bounce_velocity(side, ball.y, paddle_y, speed);
                ball.vx = vx;
                ball.vy = vy;
            }
        }

        ball.x += ball.vx;
        ball.y += ball.vy;

        // Reflect off the top and bottom walls
        if ball.y < 0.0 {
            ball.y = -ball.y;
            ball.vy = -ball.vy;
        } else if ball.y > TABLE_SIZE {
            ball.y = 2.0 * TABLE_SIZE - ball.y;
            ball.vy = -ball.vy;
        }
        ball.y = ball.y.clamp(0.0, TABLE_SIZE);

        if ball.x >= TABLE_SIZE {
            StepOutcome::Scored(Side::Left)
        } else if ball.x <= 0.0 {
            StepOutcome::Scored(Side::Right)
        } else {
            StepOutcome::InPlay
        }
    }

    /// X coordinate as seen by the right-hand player
    pub fn mirror_x(x: f32) -> f32 {
        TABLE_SIZE - x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const EPS: f32 = 1e-4;

    #[test]
    fn paddle_never_leaves_table() {
        let mut y = TABLE_CENTER;
        for _ in 0..50 {
            if let Some(next) = PhysicsSystem::move_paddle(Direction::Up, y) {
                y = next;
            }
            assert!((0.0..=TABLE_SIZE).contains(&y));
        }
        assert_eq!(y, 0.0);

        for _ in 0..50 {
            if let Some(next) = PhysicsSystem::move_paddle(Direction::Down, y) {
                y = next;
            }
            assert!((0.0..=TABLE_SIZE).contains(&y));
        }
        assert_eq!(y, TABLE_SIZE);
    }

    #[test]
    fn key_press_is_noop_at_edge() {
        assert_eq!(PhysicsSystem::key_pressed(Direction::Up, 0.0), None);
        assert_eq!(PhysicsSystem::key_pressed(Direction::Down, TABLE_SIZE), None);
        assert_eq!(PhysicsSystem::key_pressed(Direction::Up, 2.0), Some(-PADDLE_STEP));
    }

    #[test]
    fn head_on_hit_returns_straight() {
        let speed = TierStats::for_tier(SpeedTier::Medium).ball_speed;
        let (vx, vy) = PhysicsSystem::bounce_velocity(Side::Left, 40.0, 40.0, speed);
        assert!((vx - speed).abs() < EPS);
        assert!(vy.abs() < EPS);

        let (vx, vy) = PhysicsSystem::bounce_velocity(Side::Right, 40.0, 40.0, speed);
        assert!((vx + speed).abs() < EPS);
        assert!(vy.abs() < EPS);
    }

    #[test]
    fn edge_hits_deflect_steeper_than_center_hits() {
        let near_center = PhysicsSystem::deflection_angle(52.0, 50.0).abs();
        let near_edge = PhysicsSystem::deflection_angle(58.0, 50.0).abs();
        assert!(near_edge > near_center);
        assert!(PhysicsSystem::deflection_angle(42.0, 50.0) < 0.0);
        assert!(near_edge < std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn ball_reflects_off_walls_and_stays_on_table() {
        let mut ball = Ball { x: 50.0, y: 0.3, vx: 0.5, vy: -1.0 };
        let outcome = PhysicsSystem::step(&mut ball, 50.0, 50.0, 1.0);
        assert_eq!(outcome, StepOutcome::InPlay);
        assert!((ball.y - 0.7).abs() < EPS);
        assert!(ball.vy > 0.0);

        let mut ball = Ball { x: 50.0, y: 99.5, vx: 0.5, vy: 1.5 };
        PhysicsSystem::step(&mut ball, 50.0, 50.0, 1.5);
        assert!((0.0..=TABLE_SIZE).contains(&ball.y));
        assert!(ball.vy < 0.0);
    }

    #[test]
    fn ball_y_in_range_after_many_ticks() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for tier in SpeedTier::ALL {
            let speed = TierStats::for_tier(tier).ball_speed;
            let mut ball = Ball::serve(speed, &mut rng);
            for _ in 0..2_000 {
                if let StepOutcome::Scored(_) = PhysicsSystem::step(&mut ball, 50.0, 50.0, speed) {
                    ball = Ball::serve(speed, &mut rng);
                }
                assert!((0.0..=TABLE_SIZE).contains(&ball.y), "y = {}", ball.y);
            }
        }
    }

    #[test]
    fn left_paddle_returns_ball() {
        let mut ball = Ball { x: 2.0, y: 30.0, vx: -1.0, vy: 0.0 };
        let outcome = PhysicsSystem::step(&mut ball, 30.0, 50.0, 1.0);
        assert_eq!(outcome, StepOutcome::InPlay);
        assert!(ball.vx > 0.0);
        assert!((ball.x - 3.0).abs() < EPS);
    }

    #[test]
    fn missed_ball_scores_for_the_other_side() {
        let mut ball = Ball { x: 99.5, y: 90.0, vx: 1.0, vy: 0.0 };
        assert_eq!(
            PhysicsSystem::step(&mut ball, 50.0, 10.0, 1.0),
            StepOutcome::Scored(Side::Left)
        );

        let mut ball = Ball { x: 0.5, y: 90.0, vx: -1.0, vy: 0.0 };
        assert_eq!(
            PhysicsSystem::step(&mut ball, 10.0, 50.0, 1.0),
            StepOutcome::Scored(Side::Right)
        );
    }

    #[test]
    fn serve_starts_at_center_with_tier_speed() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let speed = TierStats::for_tier(SpeedTier::Fast).ball_speed;
        let ball = Ball::serve(speed, &mut rng);
        assert_eq!((ball.x, ball.y), (TABLE_CENTER, TABLE_CENTER));
        let magnitude = (ball.vx * ball.vx + ball.vy * ball.vy).sqrt();
        assert!((magnitude - speed).abs() < EPS);
    }

    #[test]
    fn mirrored_x_flips_table() {
        assert_eq!(PhysicsSystem::mirror_x(30.0), 70.0);
        assert_eq!(PhysicsSystem::mirror_x(TABLE_CENTER), TABLE_CENTER);
    }
}
