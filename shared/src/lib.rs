use serde::{Deserialize, Serialize};

pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 600.0;
pub const PADDLE_WIDTH: f32 = 10.0;
pub const PADDLE_HEIGHT: f32 = 100.0;
/// Distance between a goal line and the outer edge of its paddle.
pub const PADDLE_INSET: f32 = 20.0;
pub const PADDLE_SPEED: f32 = 5.0;
pub const BALL_SIZE: f32 = 20.0;
pub const BALL_RADIUS: f32 = BALL_SIZE / 2.0;
pub const MAX_BALL_SERVE_SPEED: i32 = 5;

pub const TICK_RATE: u32 = 60;
pub const INPUT_RATE: u32 = 60;
pub const INTERPOLATION_DELAY_MS: f64 = 80.0;
pub const SNAPSHOT_BUFFER_CAPACITY: usize = 120;
pub const CLOCK_SYNC_INTERVAL_MS: u64 = 2000;
pub const CLOCK_SYNC_EMA_WEIGHT: f64 = 0.1;
pub const MAX_PLAYERS_PER_ROOM: usize = 2;
pub const MAX_PACKET_SIZE: usize = 2048;

pub type ClientId = u32;
pub type RoomId = String;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    JoinRoom {
        request_id: u32,
        room_id: RoomId,
        username: String,
    },
    ClockPing {
        request_id: u32,
    },
    PlayerMove {
        seq: u32,
        amount: f32,
        client_time_ms: f64,
    },
    Leave,

    JoinResponse {
        request_id: u32,
        result: JoinResult,
    },
    ClockPong {
        request_id: u32,
        server_time: u64,
    },
    Joined {
        username: String,
        room_id: RoomId,
        users: Vec<PlayerInfo>,
    },
    Left {
        id: ClientId,
        username: String,
        room_id: RoomId,
    },
    GameStateUpdate {
        game_state: GameState,
        players: Vec<PlayerInfo>,
        server_time_ms: u64,
        last_processed_input_seq: Option<u32>,
    },
}

impl Packet {
    /// Correlation id of a response packet, `None` for events and requests.
    pub fn response_id(&self) -> Option<u32> {
        match self {
            Packet::JoinResponse { request_id, .. } | Packet::ClockPong { request_id, .. } => {
                Some(*request_id)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Packet::JoinRoom { .. } => "joinRoom",
            Packet::ClockPing { .. } => "clock:ping",
            Packet::PlayerMove { .. } => "playerMove",
            Packet::Leave => "leave",
            Packet::JoinResponse { .. } => "joinRoom:ack",
            Packet::ClockPong { .. } => "clock:ping:ack",
            Packet::Joined { .. } => "joined",
            Packet::Left { .. } => "left",
            Packet::GameStateUpdate { .. } => "gameStateUpdate",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum JoinResult {
    Ok {
        room_id: RoomId,
        users: Vec<PlayerInfo>,
        game_state: GameState,
        id: ClientId,
    },
    Error {
        error_message: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: ClientId,
    pub username: String,
    pub side: Side,
}

/// Finds the side controlled by `id` in a player list.
pub fn side_of(players: &[PlayerInfo], id: ClientId) -> Option<Side> {
    players.iter().find(|p| p.id == id).map(|p| p.side)
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

impl Score {
    pub fn award(&mut self, side: Side) {
        match side {
            Side::Left => self.left += 1,
            Side::Right => self.right += 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Ball {
    /// Ball placed at the field center with the given velocity.
    pub fn centered(vx: f32, vy: f32) -> Self {
        Self {
            x: FIELD_WIDTH / 2.0 - BALL_RADIUS,
            y: FIELD_HEIGHT / 2.0 - BALL_RADIUS,
            vx,
            vy,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.vx.is_finite() && self.vy.is_finite()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Paddle {
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for Paddle {
    fn default() -> Self {
        Self {
            y: FIELD_HEIGHT / 2.0 - PADDLE_HEIGHT / 2.0,
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
        }
    }
}

impl Paddle {
    /// Moves the paddle by `amount`, keeping it inside the playfield.
    ///
    /// Server input application and client prediction both go through this
    /// so a replayed input lands exactly where the server put it.
    pub fn shift(&mut self, amount: f32) {
        self.y = clamp_paddle_y(self.y + amount, self.height);
    }
}

pub fn clamp_paddle_y(y: f32, height: f32) -> f32 {
    y.clamp(0.0, FIELD_HEIGHT - height)
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Paddles {
    pub left: Paddle,
    pub right: Paddle,
}

impl Paddles {
    pub fn get(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GameState {
    pub phase: Phase,
    pub score: Score,
    pub ball: Ball,
    pub paddles: Paddles,
}

impl GameState {
    pub fn new(ball_vx: f32, ball_vy: f32) -> Self {
        Self {
            phase: Phase::Waiting,
            score: Score::default(),
            ball: Ball::centered(ball_vx, ball_vy),
            paddles: Paddles::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct InputCommand {
    pub sequence: u32,
    pub amount: f32,
    pub client_time_ms: f64,
}

impl From<InputCommand> for Packet {
    fn from(input: InputCommand) -> Self {
        Packet::PlayerMove {
            seq: input.sequence,
            amount: input.amount,
            client_time_ms: input.client_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn players() -> Vec<PlayerInfo> {
        vec![
            PlayerInfo {
                id: 7,
                username: "ana".to_string(),
                side: Side::Left,
            },
            PlayerInfo {
                id: 9,
                username: "bo".to_string(),
                side: Side::Right,
            },
        ]
    }

    #[test]
    fn test_new_game_state() {
        let state = GameState::new(3.0, -2.0);
        assert_eq!(state.phase, Phase::Waiting);
        assert_eq!(state.score, Score { left: 0, right: 0 });
        assert_eq!(state.ball.x, 390.0);
        assert_eq!(state.ball.y, 290.0);
        assert_eq!(state.ball.vx, 3.0);
        assert_eq!(state.ball.vy, -2.0);
        assert_eq!(state.paddles.left.y, 250.0);
        assert_eq!(state.paddles.right.width, PADDLE_WIDTH);
        assert_eq!(state.paddles.right.height, PADDLE_HEIGHT);
    }

    #[test]
    fn test_paddle_shift_clamps_to_field() {
        let mut paddle = Paddle::default();
        paddle.shift(-5.0);
        assert_approx_eq!(paddle.y, 245.0);

        paddle.shift(-1000.0);
        assert_eq!(paddle.y, 0.0);

        paddle.shift(1000.0);
        assert_eq!(paddle.y, FIELD_HEIGHT - PADDLE_HEIGHT);
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(Side::Left.index(), 0);
        assert_eq!(Side::Right.index(), 1);
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(side_of(&players(), 9), Some(Side::Right));
        assert_eq!(side_of(&players(), 1), None);
    }

    #[test]
    fn test_score_award() {
        let mut score = Score::default();
        score.award(Side::Right);
        score.award(Side::Right);
        score.award(Side::Left);
        assert_eq!(score, Score { left: 1, right: 2 });
    }

    #[test]
    fn test_response_id() {
        let pong = Packet::ClockPong {
            request_id: 4,
            server_time: 10,
        };
        assert_eq!(pong.response_id(), Some(4));
        assert_eq!(Packet::ClockPing { request_id: 4 }.response_id(), None);
        assert_eq!(Packet::Leave.response_id(), None);
    }

    #[test]
    fn test_input_command_into_packet() {
        let input = InputCommand {
            sequence: 12,
            amount: -5.0,
            client_time_ms: 33.5,
        };
        match Packet::from(input) {
            Packet::PlayerMove {
                seq,
                amount,
                client_time_ms,
            } => {
                assert_eq!(seq, 12);
                assert_eq!(amount, -5.0);
                assert_eq!(client_time_ms, 33.5);
            }
            other => panic!("Wrong packet type: {:?}", other),
        }
    }

    #[test]
    fn test_packet_serialization_game_state_update() {
        let mut game_state = GameState::new(4.0, 1.0);
        game_state.phase = Phase::Playing;
        game_state.score.left = 3;

        let packet = Packet::GameStateUpdate {
            game_state,
            players: players(),
            server_time_ms: 1_700_000_000_123,
            last_processed_input_seq: Some(42),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        assert!(serialized.len() < MAX_PACKET_SIZE);
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_packet_serialization_join_error() {
        let packet = Packet::JoinResponse {
            request_id: 1,
            result: JoinResult::Error {
                error_message: "Room is full".to_string(),
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        match bincode::deserialize::<Packet>(&serialized).unwrap() {
            Packet::JoinResponse {
                request_id,
                result: JoinResult::Error { error_message },
            } => {
                assert_eq!(request_id, 1);
                assert_eq!(error_message, "Room is full");
            }
            other => panic!("Wrong packet type after deserialization: {:?}", other),
        }
    }
}
