use clap::Parser;
use client::input::InputManager;
use client::network::{Client, ClientConfig, ControlEvent, Frame};
use client::prediction::KeyState;
use client::rendering::Renderer;
use client::transport::NetemConfig;
use log::{error, info};
use macroquad::prelude::*;
use tokio::sync::{mpsc, watch};

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
    #[arg(short = 'u', long, default_value = "player")]
    username: String,

    /// Simulated latency added to paddle moves, in milliseconds
    #[arg(long, default_value = "0")]
    netem_delay_ms: f64,

    /// Simulated jitter around the latency, in milliseconds
    #[arg(long, default_value = "0")]
    netem_jitter_ms: f64,

    /// Probability of dropping a paddle move, between 0 and 1
    #[arg(long, default_value = "0")]
    netem_loss: f64,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.server, &self.room, &self.username);
        config.netem = NetemConfig {
            delay_ms: self.netem_delay_ms,
            jitter_ms: self.netem_jitter_ms,
            loss: self.netem_loss.clamp(0.0, 1.0),
        };
        config
    }
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Pong".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        window_resizable: false,
        ..Default::default()
    }
}

/// Runs the network client on its own thread and runtime so the render loop
/// never waits on the network.
fn spawn_network_thread(
    config: ClientConfig,
    keys: watch::Receiver<KeyState>,
    controls: mpsc::UnboundedReceiver<ControlEvent>,
    frames: watch::Sender<Frame>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Failed to start network runtime: {}", e);
                return;
            }
        };

        runtime.block_on(async move {
            let client = match Client::connect(&config).await {
                Ok(client) => client,
                Err(e) => {
                    error!("Failed to join room {}: {}", config.room_id, e);
                    return;
                }
            };

            if let Err(e) = client.run(keys, controls, frames).await {
                error!("Client stopped: {}", e);
            }
        });
    })
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {} (room {})", args.server, args.room);
    info!("Controls: Up/Down or W/S to move, Esc to quit");
    info!("Press 1/2/3 to toggle Prediction/Reconciliation/Interpolation");

    let (keys_tx, keys_rx) = watch::channel(KeyState::default());
    let (controls_tx, controls_rx) = mpsc::unbounded_channel();
    let (frames_tx, frames_rx) = watch::channel(Frame::default());

    let network = spawn_network_thread(args.client_config(), keys_rx, controls_rx, frames_tx);

    let mut input_manager = InputManager::new();
    let mut renderer = Renderer::new(args.width, args.height);

    loop {
        let (keys, events) = input_manager.update();
        keys_tx.send_replace(keys);

        let quit = events.contains(&ControlEvent::Quit);
        for event in events {
            if controls_tx.send(event).is_err() {
                break;
            }
        }

        let frame = frames_rx.borrow().clone();
        renderer.render(&frame);

        if quit || network.is_finished() {
            break;
        }

        next_frame().await;
    }

    drop(controls_tx);
    if network.join().is_err() {
        error!("Network thread panicked");
    }
}
