//! A single game room: seated players, their match, and the periodic tick
//! task that drives the match while it is being played.

use crate::game::Simulation;
use shared::{ClientId, PlayerInfo, RoomId, Side, MAX_PLAYERS_PER_ROOM};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,
    #[error("Already seated in room {0}")]
    AlreadyInRoom(RoomId),
    #[error("Room id must not be empty")]
    EmptyRoomId,
}

/// A seated player. The side is fixed for as long as the player stays.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: ClientId,
    pub username: String,
    pub side: Side,
}

impl Player {
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            username: self.username.clone(),
            side: self.side,
        }
    }
}

/// Periodic task that asks the server loop to tick one room.
///
/// The task never touches room state itself; it only sends the room id on
/// every period, so all mutation stays on the server's event loop. Dropping
/// the handle aborts the task.
#[derive(Debug)]
pub struct TickTask {
    handle: JoinHandle<()>,
}

impl TickTask {
    pub fn spawn(room_id: RoomId, period: Duration, ticks: mpsc::UnboundedSender<RoomId>) -> Self {
        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // Skip the first tick since it fires immediately
            timer.tick().await;

            loop {
                timer.tick().await;
                if ticks.send(room_id.clone()).is_err() {
                    break;
                }
            }
        });

        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for TickTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct Room {
    id: RoomId,
    /// Kept ordered by side, left seat first.
    players: Vec<Player>,
    simulation: Simulation,
    tick_task: Option<TickTask>,
}

impl Room {
    pub fn new(id: RoomId, simulation: Simulation) -> Self {
        Self {
            id,
            players: Vec::with_capacity(MAX_PLAYERS_PER_ROOM),
            simulation,
            tick_task: None,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: ClientId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_infos(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(Player::info).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS_PER_ROOM
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    /// Seats a player on the free side, preferring left.
    pub fn seat(&mut self, id: ClientId, username: &str) -> Result<Side, RoomError> {
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }

        let side = Side::ALL
            .into_iter()
            .find(|side| self.players.iter().all(|p| p.side != *side))
            .ok_or(RoomError::RoomFull)?;

        self.players.push(Player {
            id,
            username: username.to_string(),
            side,
        });
        self.players.sort_by_key(|p| p.side.index());
        self.simulation.reset_side(side);

        Ok(side)
    }

    pub fn unseat(&mut self, id: ClientId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(index))
    }

    pub fn is_ticking(&self) -> bool {
        self.tick_task.is_some()
    }

    pub fn start_ticking(&mut self, task: TickTask) {
        if let Some(previous) = self.tick_task.replace(task) {
            previous.stop();
        }
    }

    /// Stops the tick task. Returns false if it was not running.
    pub fn stop_ticking(&mut self) -> bool {
        match self.tick_task.take() {
            Some(task) => {
                task.stop();
                true
            }
            None => false,
        }
    }
}
