use log::debug;
use rand::Rng;
use shared::{
    Ball, GameState, InputCommand, Phase, Side, BALL_SIZE, FIELD_HEIGHT, FIELD_WIDTH,
    MAX_BALL_SERVE_SPEED, PADDLE_SPEED,
};

/// How close the ball's leading edge must get to a goal line before the
/// paddle on that side can return it.
pub const PADDLE_HIT_DISTANCE: f32 = 40.0;
/// Used when a serve component draws zero, so the ball never stalls.
pub const SERVE_FALLBACK_SPEED: f32 = 3.0;
pub const MIN_BOUNCE_MULTIPLIER: f32 = 1.0;
pub const MAX_BOUNCE_MULTIPLIER: f32 = 1.1;
/// Wall bounces keep speeding the ball up; this keeps it finite.
pub const MAX_BALL_SPEED: f32 = 40.0;

/// What happened during a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepEvents {
    /// Multiplier applied to the vertical speed on a wall bounce.
    pub wall_bounce: Option<f32>,
    pub paddle_hit: Option<Side>,
    pub scored: Option<Side>,
}

/// Draws one serve velocity component in `[-5, 5]`, replacing zero with `fallback`.
pub fn serve_component<R: Rng>(rng: &mut R, fallback: f32) -> f32 {
    match rng.gen_range(-MAX_BALL_SERVE_SPEED..=MAX_BALL_SERVE_SPEED) {
        0 => fallback,
        v => v as f32,
    }
}

/// Authoritative state of one room's match.
///
/// Owns the `GameState` and the highest input sequence applied for each
/// side. The room manager drives it: `step` once per tick while playing,
/// `apply_input` whenever a seated player's move arrives.
#[derive(Debug, Clone)]
pub struct Simulation {
    state: GameState,
    last_applied: [Option<u32>; 2],
}

impl Simulation {
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        let vx = serve_component(rng, SERVE_FALLBACK_SPEED);
        let vy = serve_component(rng, SERVE_FALLBACK_SPEED);
        Self::from_state(GameState::new(vx, vy))
    }

    pub fn from_state(state: GameState) -> Self {
        Self {
            state,
            last_applied: [None; 2],
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn start(&mut self) {
        self.state.phase = Phase::Playing;
    }

    pub fn pause(&mut self) {
        self.state.phase = Phase::Waiting;
    }

    /// Applies a paddle move for `side`.
    ///
    /// Returns false when the command was dropped: non-finite amounts and
    /// sequences at or below the last applied one (duplicated or reordered
    /// datagrams). The amount is bounded to one paddle step.
    pub fn apply_input(&mut self, side: Side, input: &InputCommand) -> bool {
        if !input.amount.is_finite() {
            debug!("Dropping non-finite input {} for {:?}", input.sequence, side);
            return false;
        }

        if let Some(last) = self.last_applied[side.index()] {
            if input.sequence <= last {
                debug!(
                    "Dropping stale input {} for {:?} (last applied {})",
                    input.sequence, side, last
                );
                return false;
            }
        }

        let amount = input.amount.clamp(-PADDLE_SPEED, PADDLE_SPEED);
        self.state.paddles.get_mut(side).shift(amount);
        self.last_applied[side.index()] = Some(input.sequence);
        true
    }

    pub fn last_applied(&self, side: Side) -> Option<u32> {
        self.last_applied[side.index()]
    }

    /// Forgets the input history of a seat, so a new occupant's sequence
    /// numbers start fresh.
    pub fn reset_side(&mut self, side: Side) {
        self.last_applied[side.index()] = None;
    }

    /// Advances the ball by one tick: integrate, bounce off walls, bounce
    /// off paddles, then score and re-serve if it left the field.
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> StepEvents {
        let mut events = StepEvents::default();

        let ball = &mut self.state.ball;
        ball.x += ball.vx;
        ball.y += ball.vy;

        let floor = FIELD_HEIGHT - BALL_SIZE;
        if ball.y <= 0.0 || ball.y >= floor {
            let multiplier = rng.gen_range(MIN_BOUNCE_MULTIPLIER..MAX_BOUNCE_MULTIPLIER);
            ball.y = ball.y.clamp(0.0, floor);
            ball.vy = (-ball.vy * multiplier).clamp(-MAX_BALL_SPEED, MAX_BALL_SPEED);
            events.wall_bounce = Some(multiplier);
        }

        for side in Side::ALL {
            if self.paddle_contact(side) {
                self.state.ball.vx = -self.state.ball.vx;
                events.paddle_hit = Some(side);
            }
        }

        let scorer = if self.state.ball.x < 0.0 {
            Some(Side::Right)
        } else if self.state.ball.x > FIELD_WIDTH {
            Some(Side::Left)
        } else {
            None
        };

        if let Some(side) = scorer {
            self.state.score.award(side);
            let fallback = match side {
                Side::Right => SERVE_FALLBACK_SPEED,
                Side::Left => -SERVE_FALLBACK_SPEED,
            };
            let vx = serve_component(rng, fallback);
            let vy = serve_component(rng, fallback);
            self.state.ball = Ball::centered(vx, vy);
            events.scored = Some(side);
        }

        events
    }

    fn paddle_contact(&self, side: Side) -> bool {
        let ball = &self.state.ball;
        let paddle = self.state.paddles.get(side);

        let overlaps = ball.y + BALL_SIZE >= paddle.y && ball.y <= paddle.y + paddle.height;
        if !overlaps {
            return false;
        }

        match side {
            Side::Left => ball.vx < 0.0 && ball.x <= PADDLE_HIT_DISTANCE,
            Side::Right => ball.vx > 0.0 && ball.x + BALL_SIZE >= FIELD_WIDTH - PADDLE_HIT_DISTANCE,
        }
    }
}
