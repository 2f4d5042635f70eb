//! Server network layer handling UDP communications and room tick dispatch

use crate::client_manager::ClientManager;
use crate::room_manager::RoomManager;
use crate::utils::now_millis;
use crate::BoxError;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientId, InputCommand, JoinResult, Packet, RoomId, MAX_PACKET_SIZE, TICK_RATE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ClientId },
}

/// Messages sent from the server loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    SendToClient { packet: Packet, client_id: ClientId },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Period of every room's simulation tick
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Silence after which a peer is dropped and its seat released
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_secs_f64(1.0 / TICK_RATE as f64),
            max_clients: 64,
            client_timeout: Duration::from_secs(10),
        }
    }
}

/// Main server coordinating networking and the rooms
///
/// All room state is owned by the `run` loop. Network tasks and room tick
/// tasks only talk to it through channels.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    rooms: RoomManager,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
    tick_rx: mpsc::UnboundedReceiver<RoomId>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            rooms: RoomManager::new(config.tick_duration, tick_tx),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            tick_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToClient { packet, client_id } => {
                        let addr = clients.read().await.get_addr(client_id);
                        let Some(addr) = addr else {
                            debug!("Dropping {} for departed client {}", packet.name(), client_id);
                            continue;
                        };

                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send to client {}: {}", client_id, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    info!("Client {} timed out", client_id);
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), BoxError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to_client(&self, packet: Packet, client_id: ClientId) {
        if let Err(e) = self.game_tx.send(GameMessage::SendToClient { packet, client_id }) {
            error!("Failed to queue packet for client {}: {}", client_id, e);
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::JoinRoom {
                request_id,
                room_id,
                username,
            } => {
                let (client_id, newly_added) = {
                    let mut clients = self.clients.write().await;
                    match clients.touch(addr) {
                        Some(client_id) => (Some(client_id), false),
                        None => (clients.find_or_add(addr), true),
                    }
                };
                let Some(client_id) = client_id else {
                    warn!("Rejecting join from {}: server full", addr);
                    let result = JoinResult::Error {
                        error_message: "Server full".to_string(),
                    };
                    self.send_packet(Packet::JoinResponse { request_id, result }, addr);
                    return;
                };

                let result = match self.rooms.join(&room_id, client_id, &username) {
                    Ok(outcome) => {
                        let joined = Packet::Joined {
                            username: username.clone(),
                            room_id: outcome.room_id.clone(),
                            users: outcome.users.clone(),
                        };
                        for other in outcome.users.iter().filter(|p| p.id != client_id) {
                            self.send_to_client(joined.clone(), other.id);
                        }

                        JoinResult::Ok {
                            room_id: outcome.room_id,
                            users: outcome.users,
                            game_state: outcome.game_state,
                            id: client_id,
                        }
                    }
                    Err(e) => {
                        info!("User {} could not join room {}: {}", username, room_id, e);
                        // A peer that never got a seat does not hold a client slot
                        if newly_added {
                            self.clients.write().await.remove_client(&client_id);
                        }
                        JoinResult::Error {
                            error_message: e.to_string(),
                        }
                    }
                };

                self.send_packet(Packet::JoinResponse { request_id, result }, addr);
            }

            Packet::ClockPing { request_id } => {
                self.clients.write().await.touch(addr);
                let pong = Packet::ClockPong {
                    request_id,
                    server_time: now_millis(),
                };
                self.send_packet(pong, addr);
            }

            Packet::PlayerMove {
                seq,
                amount,
                client_time_ms,
            } => {
                let client_id = self.clients.write().await.touch(addr);
                if let Some(client_id) = client_id {
                    let input = InputCommand {
                        sequence: seq,
                        amount,
                        client_time_ms,
                    };
                    self.rooms.apply_input(client_id, &input);
                }
            }

            Packet::Leave => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    let client_id = clients.find_client_by_addr(addr);
                    if let Some(client_id) = client_id {
                        clients.remove_client(&client_id);
                    }
                    client_id
                };

                if let Some(client_id) = client_id {
                    self.handle_leave(client_id);
                }
            }

            other => {
                warn!("Unexpected {} packet from client at {}", other.name(), addr);
            }
        }
    }

    /// Releases a departed client's seat and tells the rest of its room
    fn handle_leave(&mut self, client_id: ClientId) {
        let Some(outcome) = self.rooms.leave(client_id) else {
            return;
        };

        let left = Packet::Left {
            id: outcome.player.id,
            username: outcome.player.username,
            room_id: outcome.room_id,
        };
        for other in outcome.remaining {
            self.send_to_client(left.clone(), other);
        }
    }

    fn handle_room_tick(&mut self, room_id: &str) {
        let Some(outcome) = self.rooms.tick(room_id, now_millis()) else {
            return;
        };

        for (client_id, packet) in outcome.updates {
            self.send_to_client(packet, client_id);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), BoxError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.handle_leave(client_id);
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle room tick events
                Some(room_id) = self.tick_rx.recv() => {
                    self.handle_room_tick(&room_id);
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Phase, Side};

    async fn create_test_server(config: ServerConfig) -> Server {
        Server::new("127.0.0.1:0", config).await.unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn join_room(request_id: u32, room_id: &str, username: &str) -> Packet {
        Packet::JoinRoom {
            request_id,
            room_id: room_id.to_string(),
            username: username.to_string(),
        }
    }

    fn join(request_id: u32, username: &str) -> Packet {
        join_room(request_id, "lobby", username)
    }

    fn drain(server: &mut Server) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn join_result(message: &GameMessage) -> &JoinResult {
        match message {
            GameMessage::SendPacket {
                packet: Packet::JoinResponse { result, .. },
                ..
            } => result,
            other => panic!("Expected join response, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_duration.as_micros(), 16_666);
        assert_eq!(config.max_clients, 64);
        assert_eq!(config.client_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_join_acknowledges_and_notifies_room() {
        let mut server = create_test_server(ServerConfig::default()).await;

        server.handle_packet(join(1, "ana"), addr(5001)).await;
        let messages = drain(&mut server);
        assert_eq!(messages.len(), 1);
        match join_result(&messages[0]) {
            JoinResult::Ok {
                room_id,
                users,
                game_state,
                id,
            } => {
                assert_eq!(room_id, "lobby");
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].side, Side::Left);
                assert_eq!(game_state.phase, Phase::Waiting);
                assert_eq!(*id, 1);
            }
            other => panic!("Join failed: {:?}", other),
        }

        server.handle_packet(join(1, "bo"), addr(5002)).await;
        let messages = drain(&mut server);
        assert_eq!(messages.len(), 2);

        match &messages[0] {
            GameMessage::SendToClient {
                packet: Packet::Joined { username, users, .. },
                client_id,
            } => {
                assert_eq!(*client_id, 1);
                assert_eq!(username, "bo");
                assert_eq!(users.len(), 2);
            }
            other => panic!("Expected joined notification, got {:?}", other),
        }
        match join_result(&messages[1]) {
            JoinResult::Ok { game_state, id, .. } => {
                assert_eq!(game_state.phase, Phase::Playing);
                assert_eq!(*id, 2);
            }
            other => panic!("Join failed: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_third_join_is_rejected() {
        let mut server = create_test_server(ServerConfig::default()).await;
        server.handle_packet(join(1, "ana"), addr(5001)).await;
        server.handle_packet(join(1, "bo"), addr(5002)).await;
        drain(&mut server);

        server.handle_packet(join(7, "cy"), addr(5003)).await;
        let messages = drain(&mut server);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            join_result(&messages[0]),
            &JoinResult::Error {
                error_message: "Room is full".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_join_rejected_when_server_full() {
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        };
        let mut server = create_test_server(config).await;
        server.handle_packet(join(1, "ana"), addr(5001)).await;
        drain(&mut server);

        server.handle_packet(join(2, "bo"), addr(5002)).await;
        let messages = drain(&mut server);
        assert_eq!(
            join_result(&messages[0]),
            &JoinResult::Error {
                error_message: "Server full".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_join_frees_client_slot() {
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        };
        let mut server = create_test_server(config).await;

        server.handle_packet(join_room(1, "", "ana"), addr(5001)).await;
        assert!(matches!(
            join_result(&drain(&mut server)[0]),
            JoinResult::Error { .. }
        ));
        assert!(server.clients.read().await.is_empty());

        server.handle_packet(join(2, "bo"), addr(5002)).await;
        assert!(matches!(
            join_result(&drain(&mut server)[0]),
            JoinResult::Ok { .. }
        ));
    }

    #[tokio::test]
    async fn test_rejected_join_keeps_seated_client() {
        let mut server = create_test_server(ServerConfig::default()).await;
        server.handle_packet(join(1, "ana"), addr(5001)).await;
        drain(&mut server);

        server.handle_packet(join_room(2, "other", "ana"), addr(5001)).await;
        assert_eq!(
            join_result(&drain(&mut server)[0]),
            &JoinResult::Error {
                error_message: "Already seated in room lobby".to_string()
            }
        );
        assert_eq!(server.clients.read().await.find_client_by_addr(addr(5001)), Some(1));
        assert_eq!(server.rooms.room_of(1).map(String::as_str), Some("lobby"));
    }

    #[tokio::test]
    async fn test_clock_ping_gets_pong() {
        let mut server = create_test_server(ServerConfig::default()).await;
        let before = now_millis();

        server
            .handle_packet(Packet::ClockPing { request_id: 9 }, addr(5001))
            .await;

        match drain(&mut server).pop() {
            Some(GameMessage::SendPacket {
                packet:
                    Packet::ClockPong {
                        request_id,
                        server_time,
                    },
                addr: to,
            }) => {
                assert_eq!(request_id, 9);
                assert_eq!(to, addr(5001));
                assert!(server_time >= before);
                assert!(server_time <= now_millis());
            }
            other => panic!("Expected pong, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_moves_update_paddle_and_tick_broadcasts() {
        let mut server = create_test_server(ServerConfig::default()).await;
        server.handle_packet(join(1, "ana"), addr(5001)).await;
        server.handle_packet(join(1, "bo"), addr(5002)).await;
        drain(&mut server);

        let mv = Packet::PlayerMove {
            seq: 1,
            amount: -5.0,
            client_time_ms: 10.0,
        };
        server.handle_packet(mv, addr(5001)).await;
        server.handle_room_tick("lobby");

        let messages = drain(&mut server);
        assert_eq!(messages.len(), 2);
        for message in &messages {
            match message {
                GameMessage::SendToClient {
                    packet:
                        Packet::GameStateUpdate {
                            game_state,
                            last_processed_input_seq,
                            ..
                        },
                    client_id,
                } => {
                    assert_eq!(game_state.paddles.left.y, 245.0);
                    let expected = if *client_id == 1 { Some(1) } else { None };
                    assert_eq!(*last_processed_input_seq, expected);
                }
                other => panic!("Expected state update, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_moves_from_unknown_address_are_ignored() {
        let mut server = create_test_server(ServerConfig::default()).await;
        let mv = Packet::PlayerMove {
            seq: 1,
            amount: 5.0,
            client_time_ms: 0.0,
        };
        server.handle_packet(mv, addr(5009)).await;
        assert!(drain(&mut server).is_empty());
        assert!(server.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_player() {
        let mut server = create_test_server(ServerConfig::default()).await;
        server.handle_packet(join(1, "ana"), addr(5001)).await;
        server.handle_packet(join(1, "bo"), addr(5002)).await;
        drain(&mut server);

        server.handle_packet(Packet::Leave, addr(5002)).await;
        let messages = drain(&mut server);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            GameMessage::SendToClient {
                packet: Packet::Left {
                    id,
                    username,
                    room_id,
                },
                client_id,
            } => {
                assert_eq!(*client_id, 1);
                assert_eq!(*id, 2);
                assert_eq!(username, "bo");
                assert_eq!(room_id, "lobby");
            }
            other => panic!("Expected left notification, got {:?}", other),
        }

        assert_eq!(server.clients.read().await.len(), 1);
        let room = server.rooms.room("lobby").unwrap();
        assert_eq!(room.simulation().phase(), Phase::Waiting);
    }

    #[tokio::test]
    async fn test_timeout_releases_seat() {
        let mut server = create_test_server(ServerConfig::default()).await;
        server.handle_packet(join(1, "ana"), addr(5001)).await;
        drain(&mut server);

        server.handle_leave(1);
        assert_eq!(server.rooms.room_count(), 0);
        assert!(drain(&mut server).is_empty());
    }
}
