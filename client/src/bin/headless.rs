//! Windowless client that joins a room and tracks the ball with its paddle.
//!
//! Useful for playing against with the graphical client, or for running two
//! bots against each other through the network simulator.

use clap::Parser;
use client::network::{Client, ClientConfig, ControlEvent, Frame};
use client::prediction::KeyState;
use client::transport::NetemConfig;
use client::ClientError;
use log::info;
use shared::{Phase, BALL_RADIUS};
use std::error::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Room to join
    #[arg(short = 'r', long, default_value = "lobby")]
    room: String,

    /// Name shown to the other player
    #[arg(short = 'u', long, default_value = "bot")]
    username: String,

    /// How long to play before leaving
    #[arg(long, default_value = "60")]
    seconds: u64,

    /// Simulated latency added to paddle moves, in milliseconds
    #[arg(long, default_value = "0")]
    netem_delay_ms: f64,

    /// Simulated jitter around the latency, in milliseconds
    #[arg(long, default_value = "0")]
    netem_jitter_ms: f64,

    /// Probability of dropping a paddle move, between 0 and 1
    #[arg(long, default_value = "0")]
    netem_loss: f64,
}

/// Keys that move the local paddle toward the ball.
fn track_ball(frame: &Frame) -> KeyState {
    let (Some(snapshot), Some(side)) = (&frame.snapshot, frame.local_side) else {
        return KeyState::default();
    };
    if snapshot.state.phase != Phase::Playing {
        return KeyState::default();
    }

    let paddle = snapshot.state.paddles.get(side);
    let paddle_center = paddle.y + paddle.height / 2.0;
    let ball_center = snapshot.state.ball.y + BALL_RADIUS;
    let dead_zone = paddle.height / 4.0;

    KeyState {
        up: ball_center < paddle_center - dead_zone,
        down: ball_center > paddle_center + dead_zone,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();

    let mut config = ClientConfig::new(&args.server, &args.room, &args.username);
    config.netem = NetemConfig {
        delay_ms: args.netem_delay_ms,
        jitter_ms: args.netem_jitter_ms,
        loss: args.netem_loss.clamp(0.0, 1.0),
    };

    let client = Client::connect(&config).await?;
    info!(
        "{} playing in room {} for {}s",
        args.username,
        client.room_id(),
        args.seconds
    );

    let (keys_tx, keys_rx) = watch::channel(KeyState::default());
    let (controls_tx, controls_rx) = mpsc::unbounded_channel();
    let (frames_tx, mut frames_rx) = watch::channel(Frame::default());

    let client_task = tokio::spawn(client.run(keys_rx, controls_rx, frames_tx));

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut report = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            changed = frames_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let keys = track_ball(&frames_rx.borrow_and_update());
                keys_tx.send_replace(keys);
            },

            _ = report.tick() => {
                let frame = frames_rx.borrow().clone();
                if let Some(snapshot) = &frame.snapshot {
                    info!(
                        "{:?} score {} - {}, rtt {:.1}ms, {} pending inputs",
                        snapshot.state.phase,
                        snapshot.state.score.left,
                        snapshot.state.score.right,
                        frame.rtt_ms.unwrap_or(0.0),
                        frame.pending_inputs
                    );
                }
            },

            _ = tokio::time::sleep_until(deadline) => {
                info!("Time is up, leaving room");
                break;
            },
        }
    }

    // The client task may already be gone if the connection dropped
    let _ = controls_tx.send(ControlEvent::Quit);
    match client_task.await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ClientError::Disconnected.into()),
    }
}
