//! # Pong Client Library
//!
//! This library provides the client side of networked Pong: it keeps a
//! responsive local paddle, a smooth view of the rest of the match and an
//! estimate of the server clock, all over an unreliable UDP link.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Paddle inputs are applied to the newest known state as soon as they are
//! sampled, without waiting for the server to confirm them.
//!
//! ### Server Reconciliation
//! Every authoritative update acknowledges the last input the server
//! applied for this player. Acknowledged inputs are dropped and the ones
//! still in flight are replayed on top of the server's paddle position.
//!
//! ### Snapshot Interpolation
//! Updates are buffered by server time and drawn 80ms in the past, blending
//! the two snapshots around the render time. This needs a shared notion of
//! time, which the clock module estimates from ping round trips.
//!
//! ## Module Organization
//!
//! - `clock`: server clock offset estimation
//! - `prediction`: input sequencing, prediction and reconciliation
//! - `interpolation`: the snapshot buffer and state blending
//! - `game`: the client's game state and technique toggles
//! - `transport`: UDP sending and the network simulator
//! - `network`: request/response handling and the client event loop
//! - `input`, `rendering`: macroquad keyboard sampling and drawing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig, ControlEvent, Frame};
//! use client::prediction::KeyState;
//! use tokio::sync::{mpsc, watch};
//!
//! # async fn example() -> Result<(), client::ClientError> {
//! let config = ClientConfig::new("127.0.0.1:8080", "lobby", "ana");
//! let client = Client::connect(&config).await?;
//!
//! let (_keys_tx, keys_rx) = watch::channel(KeyState::default());
//! let (_controls_tx, controls_rx) = mpsc::unbounded_channel::<ControlEvent>();
//! let (frames_tx, _frames_rx) = watch::channel(Frame::default());
//!
//! // Samples keys at 60Hz, syncs the clock every 2s and publishes frames
//! client.run(keys_rx, controls_rx, frames_tx).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod game;
pub mod input;
pub mod interpolation;
pub mod network;
pub mod prediction;
pub mod rendering;
pub mod transport;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode or decode packet: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("Disconnected from server")]
    Disconnected,
    #[error("Join rejected: {0}")]
    JoinRejected(String),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(&'static str),
}
