//! Snapshot buffering and interpolation for smooth rendering
//!
//! Server updates arrive irregularly, so the client renders slightly in the
//! past (`INTERPOLATION_DELAY_MS` behind the estimated server clock) and
//! blends the two snapshots that straddle that moment.

use shared::{GameState, PlayerInfo, INTERPOLATION_DELAY_MS};
use std::collections::VecDeque;

/// A server state stamped with the server time it was produced at
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: f64,
    pub state: GameState,
    pub players: Vec<PlayerInfo>,
}

pub fn lerp(a: f32, b: f32, alpha: f32) -> f32 {
    a + (b - a) * alpha
}

/// Blends ball position and paddle heights; everything else comes from `b`.
pub fn lerp_state(a: &GameState, b: &GameState, alpha: f32) -> GameState {
    let mut state = *b;
    state.ball.x = lerp(a.ball.x, b.ball.x, alpha);
    state.ball.y = lerp(a.ball.y, b.ball.y, alpha);
    state.paddles.left.y = lerp(a.paddles.left.y, b.paddles.left.y, alpha);
    state.paddles.right.y = lerp(a.paddles.right.y, b.paddles.right.y, alpha);
    state
}

/// Bounded snapshot history ordered by timestamp
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Inserts a snapshot at its ordered position, evicting the oldest entry
    /// when full. Returns true if the snapshot is now the newest entry.
    pub fn push(&mut self, snapshot: Snapshot) -> bool {
        let index = self
            .snapshots
            .iter()
            .rposition(|s| s.timestamp <= snapshot.timestamp)
            .map_or(0, |i| i + 1);
        let newest = index == self.snapshots.len();

        self.snapshots.insert(index, snapshot);
        if self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }

        newest
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn latest_mut(&mut self) -> Option<&mut Snapshot> {
        self.snapshots.back_mut()
    }

    /// Interpolated snapshot for `render_time`.
    ///
    /// Walks back from the newest entry to the first one not newer than the
    /// render time and blends it with its successor. If nothing older exists
    /// the newest snapshot is returned as is.
    pub fn sample_at(&self, render_time: f64) -> Option<Snapshot> {
        let newest = self.snapshots.back()?;

        let mut i = self.snapshots.len() - 1;
        while i > 0 && self.snapshots[i - 1].timestamp > render_time {
            i -= 1;
        }
        if i == 0 {
            return Some(newest.clone());
        }

        let a = &self.snapshots[i - 1];
        let b = &self.snapshots[i];
        let span = b.timestamp - a.timestamp;
        let alpha = if span > 0.0 {
            ((render_time - a.timestamp) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Some(Snapshot {
            timestamp: render_time,
            state: lerp_state(&a.state, &b.state, alpha as f32),
            players: b.players.clone(),
        })
    }

    /// Snapshot to draw when the estimated server clock reads `server_now`.
    pub fn render(&self, server_now: f64) -> Option<Snapshot> {
        self.sample_at(server_now - INTERPOLATION_DELAY_MS)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
