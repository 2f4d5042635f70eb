//! Client-side prediction and server reconciliation for the local paddle
//!
//! Every nonzero input is applied to the newest snapshot as soon as it is
//! sampled, so the local paddle moves without waiting a round trip. Inputs
//! stay pending until the server acknowledges their sequence number. When
//! an authoritative snapshot arrives, acknowledged inputs are discarded and
//! the rest are replayed on top of the server's paddle position.

use crate::interpolation::SnapshotBuffer;
use log::debug;
use shared::{side_of, ClientId, InputCommand, PADDLE_SPEED};
use std::collections::VecDeque;

pub const MAX_PENDING_INPUTS: usize = 256;

/// Movement keys held during one input sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub up: bool,
    pub down: bool,
}

impl KeyState {
    /// Signed paddle displacement; zero when neither or both keys are held.
    pub fn amount(&self) -> f32 {
        let mut amount = 0.0;
        if self.up {
            amount -= PADDLE_SPEED;
        }
        if self.down {
            amount += PADDLE_SPEED;
        }
        amount
    }
}

#[derive(Debug, Clone)]
pub struct InputPredictor {
    next_sequence: u32,
    pending: VecDeque<InputCommand>,
}

impl InputPredictor {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            pending: VecDeque::new(),
        }
    }

    /// Turns a sampled displacement into a sequenced command.
    ///
    /// Returns `None` for a zero displacement; nothing is queued or sent.
    pub fn record(&mut self, amount: f32, now_ms: f64) -> Option<InputCommand> {
        if amount == 0.0 || !amount.is_finite() {
            return None;
        }

        let input = InputCommand {
            sequence: self.next_sequence,
            amount,
            client_time_ms: now_ms,
        };
        self.next_sequence += 1;

        if self.pending.len() >= MAX_PENDING_INPUTS {
            if let Some(dropped) = self.pending.pop_front() {
                debug!("Pending input queue full, dropping input {}", dropped.sequence);
            }
        }
        self.pending.push_back(input);

        Some(input)
    }

    /// Applies an input to the local paddle of the newest snapshot.
    pub fn predict(&self, input: &InputCommand, buffer: &mut SnapshotBuffer, local_id: ClientId) {
        let Some(snapshot) = buffer.latest_mut() else {
            return;
        };
        let Some(side) = side_of(&snapshot.players, local_id) else {
            return;
        };

        snapshot.state.paddles.get_mut(side).shift(input.amount);
    }

    /// Drops every pending input the server has applied.
    pub fn acknowledge(&mut self, last_processed: u32) {
        while self
            .pending
            .front()
            .is_some_and(|input| input.sequence <= last_processed)
        {
            self.pending.pop_front();
        }
    }

    /// Rebuilds the local paddle of the newest snapshot from its
    /// authoritative position plus every input still in flight.
    ///
    /// Must be called right after the authoritative snapshot was pushed and
    /// only when it became the newest entry.
    pub fn reconcile(
        &mut self,
        last_processed: u32,
        buffer: &mut SnapshotBuffer,
        local_id: ClientId,
    ) {
        self.acknowledge(last_processed);
        if self.pending.is_empty() {
            return;
        }

        let Some(snapshot) = buffer.latest_mut() else {
            return;
        };
        let Some(side) = side_of(&snapshot.players, local_id) else {
            return;
        };

        let paddle = snapshot.state.paddles.get_mut(side);
        for input in &self.pending {
            paddle.shift(input.amount);
        }
        debug!(
            "Replayed {} pending inputs after ack {}",
            self.pending.len(),
            last_processed
        );
    }

    pub fn pending(&self) -> impl Iterator<Item = &InputCommand> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for InputPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::Snapshot;
    use assert_approx_eq::assert_approx_eq;
    use shared::{GameState, PlayerInfo, Side, FIELD_HEIGHT, PADDLE_HEIGHT};

    const LOCAL: ClientId = 2;

    fn buffer_with(left_y: f32, right_y: f32, timestamp: f64) -> SnapshotBuffer {
        let mut buffer = SnapshotBuffer::new(16);
        push(&mut buffer, left_y, right_y, timestamp);
        buffer
    }

    fn push(buffer: &mut SnapshotBuffer, left_y: f32, right_y: f32, timestamp: f64) -> bool {
        let mut state = GameState::new(3.0, 0.0);
        state.paddles.left.y = left_y;
        state.paddles.right.y = right_y;
        buffer.push(Snapshot {
            timestamp,
            state,
            players: vec![
                PlayerInfo {
                    id: 1,
                    username: "ana".to_string(),
                    side: Side::Left,
                },
                PlayerInfo {
                    id: LOCAL,
                    username: "bo".to_string(),
                    side: Side::Right,
                },
            ],
        })
    }

    fn right_y(buffer: &SnapshotBuffer) -> f32 {
        buffer.latest().unwrap().state.paddles.right.y
    }

    #[test]
    fn test_key_state_amount() {
        let up = KeyState { up: true, down: false };
        let down = KeyState { up: false, down: true };
        let both = KeyState { up: true, down: true };
        assert_eq!(up.amount(), -5.0);
        assert_eq!(down.amount(), 5.0);
        assert_eq!(both.amount(), 0.0);
        assert_eq!(KeyState::default().amount(), 0.0);
    }

    #[test]
    fn test_record_sequences_nonzero_inputs() {
        let mut predictor = InputPredictor::new();
        assert!(predictor.record(0.0, 1.0).is_none());

        let first = predictor.record(-5.0, 16.0).unwrap();
        let second = predictor.record(5.0, 32.0).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.client_time_ms, 16.0);
        assert_eq!(second.sequence, 2);
        assert_eq!(predictor.pending_len(), 2);
    }

    #[test]
    fn test_pending_queue_is_bounded() {
        let mut predictor = InputPredictor::new();
        for i in 0..(MAX_PENDING_INPUTS + 10) {
            predictor.record(5.0, i as f64);
        }

        assert_eq!(predictor.pending_len(), MAX_PENDING_INPUTS);
        assert_eq!(predictor.pending().next().unwrap().sequence, 11);
    }

    #[test]
    fn test_predict_moves_local_side_only() {
        let mut predictor = InputPredictor::new();
        let mut buffer = buffer_with(250.0, 250.0, 0.0);

        let input = predictor.record(-5.0, 0.0).unwrap();
        predictor.predict(&input, &mut buffer, LOCAL);

        let state = buffer.latest().unwrap().state;
        assert_approx_eq!(state.paddles.right.y, 245.0);
        assert_approx_eq!(state.paddles.left.y, 250.0);
    }

    #[test]
    fn test_predict_clamps_to_field() {
        let mut predictor = InputPredictor::new();
        let mut buffer = buffer_with(250.0, FIELD_HEIGHT - PADDLE_HEIGHT - 2.0, 0.0);

        let input = predictor.record(5.0, 0.0).unwrap();
        predictor.predict(&input, &mut buffer, LOCAL);
        assert_eq!(right_y(&buffer), FIELD_HEIGHT - PADDLE_HEIGHT);
    }

    #[test]
    fn test_predict_for_unseated_client_is_noop() {
        let mut predictor = InputPredictor::new();
        let mut buffer = buffer_with(250.0, 250.0, 0.0);

        let input = predictor.record(5.0, 0.0).unwrap();
        predictor.predict(&input, &mut buffer, 99);
        assert_eq!(right_y(&buffer), 250.0);
        assert_eq!(buffer.latest().unwrap().state.paddles.left.y, 250.0);
    }

    #[test]
    fn test_reconcile_replays_unacknowledged_inputs() {
        let mut predictor = InputPredictor::new();
        for _ in 0..5 {
            predictor.record(-5.0, 0.0);
        }

        // Server applied the first three inputs: 250 - 15
        let mut buffer = buffer_with(250.0, 235.0, 100.0);
        predictor.reconcile(3, &mut buffer, LOCAL);

        assert_eq!(predictor.pending_len(), 2);
        assert_approx_eq!(right_y(&buffer), 225.0);
    }

    #[test]
    fn test_reconcile_all_acknowledged_matches_server() {
        let mut predictor = InputPredictor::new();
        let mut buffer = buffer_with(250.0, 250.0, 0.0);
        for _ in 0..4 {
            let input = predictor.record(5.0, 0.0).unwrap();
            predictor.predict(&input, &mut buffer, LOCAL);
        }

        push(&mut buffer, 250.0, 270.0, 50.0);
        predictor.reconcile(4, &mut buffer, LOCAL);

        assert_eq!(predictor.pending_len(), 0);
        assert_eq!(right_y(&buffer), 270.0);
    }

    #[test]
    fn test_reconcile_clamps_each_replayed_step() {
        let mut predictor = InputPredictor::new();
        predictor.record(-5.0, 0.0);
        predictor.record(-5.0, 0.0);
        predictor.record(5.0, 0.0);

        let mut buffer = buffer_with(250.0, 3.0, 0.0);
        predictor.reconcile(0, &mut buffer, LOCAL);

        // 3 -> 0 -> 0 -> 5, not 3 - 10 + 5
        assert_approx_eq!(right_y(&buffer), 5.0);
    }

    #[test]
    fn test_acknowledge_is_monotonic_prefix_prune() {
        let mut predictor = InputPredictor::new();
        for _ in 0..3 {
            predictor.record(5.0, 0.0);
        }

        predictor.acknowledge(2);
        let remaining: Vec<u32> = predictor.pending().map(|i| i.sequence).collect();
        assert_eq!(remaining, vec![3]);

        predictor.acknowledge(1);
        assert_eq!(predictor.pending_len(), 1);
    }
}
