//! Client network layer: request/response correlation and the event loop
//! that drives input sampling, clock sync and frame publication.

use crate::clock::{ClockSample, ClockSync, LocalClock};
use crate::game::{ClientGameState, Settings};
use crate::interpolation::Snapshot;
use crate::prediction::KeyState;
use crate::transport::{NetemConfig, NetworkSimulator, Transport, UdpTransport};
use crate::ClientError;
use bincode::deserialize;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    ClientId, JoinResult, Packet, PlayerInfo, RoomId, Side, CLOCK_SYNC_INTERVAL_MS, INPUT_RATE,
    MAX_PACKET_SIZE,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{interval, interval_at, sleep, timeout, Instant, MissedTickBehavior};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const FRAME_RATE: u32 = 60;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub room_id: RoomId,
    pub username: String,
    pub netem: NetemConfig,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server: &str, room_id: &str, username: &str) -> Self {
        Self {
            server: server.to_string(),
            room_id: room_id.to_string(),
            username: username.to_string(),
            netem: NetemConfig::default(),
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Events from the UI thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    TogglePrediction,
    ToggleReconciliation,
    ToggleInterpolation,
    Quit,
}

/// Everything the renderer needs for one frame
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub snapshot: Option<Snapshot>,
    pub local_id: Option<ClientId>,
    pub local_side: Option<Side>,
    pub room_id: RoomId,
    pub users: Vec<PlayerInfo>,
    pub settings: Settings,
    pub rtt_ms: Option<f64>,
    pub pending_inputs: usize,
}

type PendingRequests = Arc<Mutex<HashMap<u32, oneshot::Sender<Packet>>>>;

/// Sends packets and matches responses to the requests that caused them
#[derive(Clone)]
pub struct Requester {
    transport: Arc<dyn Transport>,
    pending: PendingRequests,
    next_request_id: Arc<AtomicU32>,
    timeout: Duration,
}

impl Requester {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_request_id: Arc::new(AtomicU32::new(1)),
            timeout,
        }
    }

    pub async fn send(&self, packet: &Packet) -> Result<(), ClientError> {
        self.transport.send(packet).await
    }

    /// Sends the packet built for a fresh request id and waits for the
    /// response carrying the same id.
    pub async fn request<F>(&self, build: F) -> Result<Packet, ClientError>
    where
        F: FnOnce(u32) -> Packet,
    {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        if let Err(e) = self.transport.send(&build(request_id)).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Hands a response to its waiting request.
    ///
    /// Returns the packet back when nothing is waiting for it.
    pub async fn resolve(&self, packet: Packet) -> Option<Packet> {
        let Some(request_id) = packet.response_id() else {
            return Some(packet);
        };

        let waiter = self.pending.lock().await.remove(&request_id);
        match waiter {
            Some(tx) => {
                // The requester may have given up in the meantime
                let _ = tx.send(packet);
                None
            }
            None => Some(packet),
        }
    }
}

/// Runs one ping round against the server clock.
pub async fn sync_clock(
    requester: &Requester,
    clock: &LocalClock,
) -> Result<ClockSample, ClientError> {
    let t0 = clock.now_ms();
    match requester
        .request(|request_id| Packet::ClockPing { request_id })
        .await?
    {
        Packet::ClockPong { server_time, .. } => Ok(ClockSample {
            t0,
            t1: clock.now_ms(),
            server_time: server_time as f64,
        }),
        other => Err(ClientError::UnexpectedResponse(other.name())),
    }
}

/// Spawns task that continuously listens for incoming packets
fn spawn_receiver(
    socket: Arc<UdpSocket>,
    requester: Requester,
    incoming: mpsc::UnboundedSender<Packet>,
) {
    tokio::spawn(async move {
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            match socket.recv(&mut buffer).await {
                Ok(len) => match deserialize::<Packet>(&buffer[0..len]) {
                    Ok(packet) => {
                        if let Some(packet) = requester.resolve(packet).await {
                            if incoming.send(packet).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => warn!("Failed to deserialize packet: {}", e),
                },
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            }
        }
    });
}

pub struct Client {
    requester: Requester,
    incoming: mpsc::UnboundedReceiver<Packet>,
    clock: LocalClock,
    clock_sync: ClockSync,
    game: ClientGameState,
    room_id: RoomId,
    users: Vec<PlayerInfo>,
}

impl Client {
    fn new(requester: Requester, incoming: mpsc::UnboundedReceiver<Packet>) -> Self {
        Self {
            requester,
            incoming,
            clock: LocalClock::new(),
            clock_sync: ClockSync::new(),
            game: ClientGameState::new(),
            room_id: RoomId::new(),
            users: Vec::new(),
        }
    }

    /// Opens the socket, aligns the clock once and joins the configured room.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        info!("Connecting to {}...", config.server);

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(config.server.as_str()).await?;
        let socket = Arc::new(socket);

        let udp: Arc<dyn Transport> = Arc::new(UdpTransport::new(Arc::clone(&socket)));
        let transport: Arc<dyn Transport> = if config.netem.is_enabled() {
            info!(
                "Simulating {}ms +/- {}ms latency and {:.0}% loss on moves",
                config.netem.delay_ms,
                config.netem.jitter_ms,
                config.netem.loss * 100.0
            );
            Arc::new(NetworkSimulator::new(
                udp,
                config.netem,
                StdRng::from_entropy(),
            ))
        } else {
            udp
        };

        let requester = Requester::new(transport, config.request_timeout);
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        spawn_receiver(socket, requester.clone(), incoming_tx);

        let mut client = Client::new(requester, incoming_rx);

        let initial_sync = sync_clock(&client.requester, &client.clock).await;
        client.record_clock(initial_sync);

        client.join(&config.room_id, &config.username).await?;
        Ok(client)
    }

    async fn join(&mut self, room_id: &str, username: &str) -> Result<(), ClientError> {
        let response = self
            .requester
            .request(|request_id| Packet::JoinRoom {
                request_id,
                room_id: room_id.to_string(),
                username: username.to_string(),
            })
            .await?;

        match response {
            Packet::JoinResponse {
                result:
                    JoinResult::Ok {
                        room_id,
                        users,
                        game_state,
                        id,
                    },
                ..
            } => {
                info!("Joined room {} as client {}", room_id, id);
                self.game.set_local_id(id);

                let server_now = self.clock_sync.server_time(self.clock.now_ms());
                self.game
                    .apply_server_state(game_state, users.clone(), server_now, None);

                self.room_id = room_id;
                self.users = users;
                Ok(())
            }
            Packet::JoinResponse {
                result: JoinResult::Error { error_message },
                ..
            } => Err(ClientError::JoinRejected(error_message)),
            other => Err(ClientError::UnexpectedResponse(other.name())),
        }
    }

    pub fn game(&self) -> &ClientGameState {
        &self.game
    }

    pub fn clock_sync(&self) -> &ClockSync {
        &self.clock_sync
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn users(&self) -> &[PlayerInfo] {
        &self.users
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::GameStateUpdate {
                game_state,
                players,
                server_time_ms,
                last_processed_input_seq,
            } => {
                self.game.apply_server_state(
                    game_state,
                    players,
                    server_time_ms as f64,
                    last_processed_input_seq,
                );
            }

            Packet::Joined {
                username, users, ..
            } => {
                info!("User {} joined the room", username);
                self.users = users;
            }

            Packet::Left {
                id,
                username,
                room_id,
            } => {
                info!("User {} left room {}", username, room_id);
                self.users.retain(|user| user.id != id);
            }

            Packet::JoinResponse { .. } | Packet::ClockPong { .. } => {
                debug!("Ignoring late {}", packet.name());
            }

            other => {
                warn!("Unexpected packet type: {}", other.name());
            }
        }
    }

    async fn send_input(&mut self, keys: KeyState) -> Result<(), ClientError> {
        let Some(input) = self.game.record_input(keys.amount(), self.clock.now_ms()) else {
            return Ok(());
        };

        self.requester.send(&Packet::from(input)).await
    }

    fn record_clock(&mut self, result: Result<ClockSample, ClientError>) {
        match result {
            Ok(sample) => {
                self.clock_sync.record(sample);
            }
            Err(e) => debug!("Clock sync round skipped: {}", e),
        }
    }

    fn handle_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::TogglePrediction => self.game.settings.toggle_prediction(),
            ControlEvent::ToggleReconciliation => self.game.settings.toggle_reconciliation(),
            ControlEvent::ToggleInterpolation => self.game.settings.toggle_interpolation(),
            ControlEvent::Quit => {}
        }
    }

    pub fn frame(&self) -> Frame {
        let server_now = self.clock_sync.server_time(self.clock.now_ms());

        Frame {
            snapshot: self.game.render_snapshot(server_now),
            local_id: self.game.local_id(),
            local_side: self.game.local_side(),
            room_id: self.room_id.clone(),
            users: self.users.clone(),
            settings: self.game.settings,
            rtt_ms: self.clock_sync.last_rtt_ms(),
            pending_inputs: self.game.pending_inputs(),
        }
    }

    /// Main client loop; returns after a quit event or once the UI side hangs up.
    pub async fn run(
        mut self,
        keys: watch::Receiver<KeyState>,
        mut controls: mpsc::UnboundedReceiver<ControlEvent>,
        frames: watch::Sender<Frame>,
    ) -> Result<(), ClientError> {
        let mut input_interval = interval(Duration::from_secs_f64(1.0 / INPUT_RATE as f64));
        input_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let clock_period = Duration::from_millis(CLOCK_SYNC_INTERVAL_MS);
        let mut clock_interval = interval_at(Instant::now() + clock_period, clock_period);

        let mut frame_interval = interval(Duration::from_secs_f64(1.0 / FRAME_RATE as f64));
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (clock_tx, mut clock_rx) = mpsc::unbounded_channel();

        let result = loop {
            tokio::select! {
                packet = self.incoming.recv() => {
                    match packet {
                        Some(packet) => self.handle_packet(packet),
                        None => break Err(ClientError::Disconnected),
                    }
                },

                _ = input_interval.tick() => {
                    let keys = *keys.borrow();
                    if let Err(e) = self.send_input(keys).await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = clock_interval.tick() => {
                    let requester = self.requester.clone();
                    let clock = self.clock;
                    let clock_tx = clock_tx.clone();
                    tokio::spawn(async move {
                        let _ = clock_tx.send(sync_clock(&requester, &clock).await);
                    });
                },

                Some(result) = clock_rx.recv() => {
                    self.record_clock(result);
                },

                event = controls.recv() => {
                    match event {
                        Some(ControlEvent::Quit) | None => break Ok(()),
                        Some(event) => self.handle_control(event),
                    }
                },

                _ = frame_interval.tick() => {
                    if frames.send(self.frame()).is_err() {
                        break Ok(());
                    }
                },
            }
        };

        if let Err(e) = self.requester.send(&Packet::Leave).await {
            debug!("Failed to send leave: {}", e);
        }
        info!("Left room {}", self.room_id);

        result
    }
}
