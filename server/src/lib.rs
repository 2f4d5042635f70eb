//! # Pong Server Library
//!
//! This library provides the authoritative server for networked two-player
//! Pong. It owns every room's canonical match, applies player moves and
//! broadcasts the resulting state to the room's members.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Ball physics, paddle movement and scoring are only ever decided here.
//! Clients predict their own paddle and interpolate everything else, but
//! always converge on what the server broadcasts.
//!
//! ### Room Management
//! Players join named rooms of two. The first player waits; the second one
//! starts the match and the room's periodic tick. When a player leaves or
//! times out the room returns to waiting, sends one last update and stops
//! ticking. Empty rooms are deleted.
//!
//! ### Clock Service
//! Clients ping the server to estimate the offset between their local clock
//! and server time. Every state broadcast carries the server timestamp so
//! clients can place it on their interpolation timeline.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! All room state lives on one loop that handles decoded packets, liveness
//! timeouts and room ticks in sequence. Room tick tasks only send the room
//! id into the loop, so no state is shared between tasks.
//!
//! ### UDP-Based Communication
//! Uses a single UDP socket and bincode-encoded `shared::Packet`s. Peers are
//! identified by socket address; joins and clock pings carry a request id
//! that the server echoes in its response.
//!
//! ## Module Organization
//!
//! - `game`: the per-room match simulation
//! - `room`: a room's seats and its tick task
//! - `room_manager`: the room registry and match lifecycle
//! - `client_manager`: peer registry and liveness tracking
//! - `network`: sockets, tasks and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::BoxError> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!
//!     // Runs until the process is stopped:
//!     // - receives joins, moves, clock pings and leaves
//!     // - ticks every playing room at 60Hz
//!     // - broadcasts each room's state to its two players
//!     // - releases the seats of clients that go silent
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
pub mod room;
pub mod room_manager;
pub mod utils;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
