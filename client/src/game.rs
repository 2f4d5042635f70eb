//! Client game state: the snapshot history plus the local player's
//! predicted inputs, with runtime switches for each netcode technique.

use crate::interpolation::{Snapshot, SnapshotBuffer};
use crate::prediction::InputPredictor;
use log::{debug, info};
use shared::{
    side_of, ClientId, GameState, InputCommand, PlayerInfo, Side, SNAPSHOT_BUFFER_CAPACITY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub prediction: bool,
    pub reconciliation: bool,
    pub interpolation: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prediction: true,
            reconciliation: true,
            interpolation: true,
        }
    }
}

impl Settings {
    pub fn toggle_prediction(&mut self) {
        self.prediction = !self.prediction;
        info!("Client-side prediction: {}", self.prediction);
    }

    pub fn toggle_reconciliation(&mut self) {
        self.reconciliation = !self.reconciliation;
        info!("Server reconciliation: {}", self.reconciliation);
    }

    pub fn toggle_interpolation(&mut self) {
        self.interpolation = !self.interpolation;
        info!("Interpolation: {}", self.interpolation);
    }
}

pub struct ClientGameState {
    pub settings: Settings,
    local_id: Option<ClientId>,
    predictor: InputPredictor,
    snapshots: SnapshotBuffer,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            local_id: None,
            predictor: InputPredictor::new(),
            snapshots: SnapshotBuffer::new(SNAPSHOT_BUFFER_CAPACITY),
        }
    }

    pub fn set_local_id(&mut self, id: ClientId) {
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<ClientId> {
        self.local_id
    }

    /// Side of the local player in the newest snapshot.
    pub fn local_side(&self) -> Option<Side> {
        let id = self.local_id?;
        side_of(&self.snapshots.latest()?.players, id)
    }

    /// Stores an authoritative state and reconciles pending inputs against it.
    pub fn apply_server_state(
        &mut self,
        state: GameState,
        players: Vec<PlayerInfo>,
        server_time_ms: f64,
        last_processed_input: Option<u32>,
    ) {
        let newest = self.snapshots.push(Snapshot {
            timestamp: server_time_ms,
            state,
            players,
        });

        // No acknowledgement yet means every pending input is still in flight
        let last_processed = last_processed_input.unwrap_or(0);

        match self.local_id {
            Some(local_id)
                if newest && self.settings.prediction && self.settings.reconciliation =>
            {
                self.predictor
                    .reconcile(last_processed, &mut self.snapshots, local_id);
            }
            _ => {
                if !newest {
                    debug!("Late snapshot at {:.0}, not reconciling", server_time_ms);
                }
                self.predictor.acknowledge(last_processed);
            }
        }
    }

    /// Sequences a sampled displacement and predicts it locally.
    ///
    /// Returns the command to send, or `None` when there is nothing to send.
    pub fn record_input(&mut self, amount: f32, now_ms: f64) -> Option<InputCommand> {
        let local_id = self.local_id?;
        let input = self.predictor.record(amount, now_ms)?;

        if self.settings.prediction {
            self.predictor.predict(&input, &mut self.snapshots, local_id);
        }

        Some(input)
    }

    /// State to draw when the estimated server clock reads `server_now`.
    ///
    /// With prediction on, the local paddle is taken from the newest
    /// snapshot so it stays responsive while the rest is drawn in the past.
    pub fn render_snapshot(&self, server_now: f64) -> Option<Snapshot> {
        let latest = self.snapshots.latest()?;
        if !self.settings.interpolation {
            return Some(latest.clone());
        }

        let mut snapshot = self.snapshots.render(server_now)?;
        if self.settings.prediction {
            if let Some(side) = self.local_side() {
                *snapshot.state.paddles.get_mut(side) = *latest.state.paddles.get(side);
            }
        }

        Some(snapshot)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.latest()
    }

    pub fn pending_inputs(&self) -> usize {
        self.predictor.pending_len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
