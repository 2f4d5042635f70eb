//! Room registry and match lifecycle for the server
//!
//! The room manager is the only owner of rooms. Every membership change and
//! every simulation step goes through it:
//! - `join` creates rooms on first reference and seats up to two players
//! - `leave` unseats a player, pausing or deleting the room
//! - `apply_input` routes a seated player's move to their side's paddle
//! - `tick` advances a playing room and builds the per-member broadcast
//!
//! A room starts its tick task when its second player sits down. When the
//! room drops below two players it goes back to waiting, and the next tick
//! sends one final update before stopping the task.

use crate::game::{Simulation, StepEvents};
use crate::room::{Room, RoomError, TickTask};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    ClientId, GameState, InputCommand, Packet, Phase, PlayerInfo, RoomId, Side,
    MAX_PLAYERS_PER_ROOM,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    pub side: Side,
    pub users: Vec<PlayerInfo>,
    pub game_state: GameState,
    /// True when this join filled the room and started the match.
    pub started: bool,
}

#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub room_id: RoomId,
    pub player: PlayerInfo,
    /// Members still seated, to be told about the departure.
    pub remaining: Vec<ClientId>,
    pub room_closed: bool,
}

#[derive(Debug)]
pub struct TickOutcome {
    /// One `GameStateUpdate` per member, each acknowledging that member's inputs.
    pub updates: Vec<(ClientId, Packet)>,
    pub events: StepEvents,
    /// True when this was the final broadcast and the tick task stopped.
    pub stopped: bool,
}

pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
    player_rooms: HashMap<ClientId, RoomId>,
    tick_period: Duration,
    ticks: mpsc::UnboundedSender<RoomId>,
    rng: StdRng,
}

impl RoomManager {
    /// Creates an empty registry. Tick tasks of rooms send their id on `ticks`
    /// once per `tick_period`.
    pub fn new(tick_period: Duration, ticks: mpsc::UnboundedSender<RoomId>) -> Self {
        Self::with_rng(tick_period, ticks, StdRng::from_entropy())
    }

    pub fn with_rng(
        tick_period: Duration,
        ticks: mpsc::UnboundedSender<RoomId>,
        rng: StdRng,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            tick_period,
            ticks,
            rng,
        }
    }

    pub fn join(
        &mut self,
        room_id: &str,
        client_id: ClientId,
        username: &str,
    ) -> Result<JoinOutcome, RoomError> {
        if room_id.trim().is_empty() {
            return Err(RoomError::EmptyRoomId);
        }

        if let Some(existing) = self.player_rooms.get(&client_id) {
            return Err(RoomError::AlreadyInRoom(existing.clone()));
        }

        let rng = &mut self.rng;
        let room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            info!("Room {} created", room_id);
            Room::new(room_id.to_string(), Simulation::new(rng))
        });

        let side = room.seat(client_id, username)?;
        self.player_rooms.insert(client_id, room_id.to_string());
        info!(
            "User {} ({}) joined room {} on the {:?} side",
            username, client_id, room_id, side
        );

        let mut started = false;
        if room.is_full() && room.simulation().phase() != Phase::Playing {
            room.simulation_mut().start();
            if !room.is_ticking() {
                room.start_ticking(TickTask::spawn(
                    room_id.to_string(),
                    self.tick_period,
                    self.ticks.clone(),
                ));
            }
            started = true;
            info!("Room {} is full. Starting game.", room_id);
        }

        Ok(JoinOutcome {
            room_id: room_id.to_string(),
            side,
            users: room.player_infos(),
            game_state: *room.simulation().state(),
            started,
        })
    }

    /// Removes a player from whatever room they are seated in.
    ///
    /// Returns `None` for connections that are not seated anywhere.
    pub fn leave(&mut self, client_id: ClientId) -> Option<LeaveOutcome> {
        let Some(room_id) = self.player_rooms.remove(&client_id) else {
            debug!("Ignoring leave from unseated client {}", client_id);
            return None;
        };

        let room = self.rooms.get_mut(&room_id)?;
        let player = room.unseat(client_id)?;
        info!(
            "User {} ({}) left room {}",
            player.username, client_id, room_id
        );

        let remaining: Vec<ClientId> = room.players().iter().map(|p| p.id).collect();
        let room_closed = room.is_empty();

        if room_closed {
            self.rooms.remove(&room_id);
            info!("Room {} deleted as it is empty.", room_id);
        } else if room.len() < MAX_PLAYERS_PER_ROOM {
            room.simulation_mut().pause();
            info!(
                "Room {} has less than {} players. Stopping game.",
                room_id, MAX_PLAYERS_PER_ROOM
            );
        }

        Some(LeaveOutcome {
            room_id,
            player: player.info(),
            remaining,
            room_closed,
        })
    }

    /// Applies a move for a seated player. Moves from unseated connections
    /// are ignored.
    pub fn apply_input(&mut self, client_id: ClientId, input: &InputCommand) -> bool {
        let Some(room_id) = self.player_rooms.get(&client_id) else {
            debug!("Ignoring input from unseated client {}", client_id);
            return false;
        };
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let Some(side) = room.player(client_id).map(|p| p.side) else {
            return false;
        };

        room.simulation_mut().apply_input(side, input)
    }

    /// Runs one tick of a room.
    ///
    /// Returns `None` for unknown rooms and for ticks that were already
    /// queued when the room's tick task stopped.
    pub fn tick(&mut self, room_id: &str, server_time_ms: u64) -> Option<TickOutcome> {
        let room = self.rooms.get_mut(room_id)?;
        if !room.is_ticking() {
            return None;
        }

        let events = if room.simulation().phase() == Phase::Playing {
            room.simulation_mut().step(&mut self.rng)
        } else {
            StepEvents::default()
        };

        if let Some(side) = events.scored {
            let score = room.simulation().state().score;
            debug!(
                "Room {}: {:?} scored ({} - {})",
                room_id, side, score.left, score.right
            );
        }

        let game_state = *room.simulation().state();
        let players = room.player_infos();
        let updates = room
            .players()
            .iter()
            .map(|p| {
                let packet = Packet::GameStateUpdate {
                    game_state,
                    players: players.clone(),
                    server_time_ms,
                    last_processed_input_seq: room.simulation().last_applied(p.side),
                };
                (p.id, packet)
            })
            .collect();

        let stopped = room.len() < MAX_PLAYERS_PER_ROOM && room.stop_ticking();
        if stopped {
            info!("Room {} tick stopped after final update", room_id);
        }

        Some(TickOutcome {
            updates,
            events,
            stopped,
        })
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_of(&self, client_id: ClientId) -> Option<&RoomId> {
        self.player_rooms.get(&client_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
