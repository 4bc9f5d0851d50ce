//! Server network layer: UDP transport around the authority world

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::world::World;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientId, Packet, SceneLayout, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Ticks between clock broadcasts.
const CLOCK_SYNC_TICKS: u64 = 30;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: ClientId,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ClientId>,
    },
}

/// Authority server: owns the world and pumps packets in and out of it
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: World,
    tick_duration: Duration,
    tick: u64,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: ServerConfig,
        scene: SceneLayout,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            tick_duration: config.tick_duration,
            world: World::new(config, scene),
            tick: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

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

    /// Spawns task that drains the outgoing packet queue
    async fn spawn_network_sender(&mut self) {
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
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that reports clients silent for too long
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<ClientId>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn client_at(&self, addr: SocketAddr) -> Option<ClientId> {
        let mut clients = self.clients.write().await;
        let client_id = clients.find_client_by_addr(addr)?;
        clients.touch(client_id);
        Some(client_id)
    }

    async fn drop_client(&mut self, client_id: ClientId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        self.world.client_disconnected(client_id);
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {}: protocol {} but server speaks {}",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_client(existing_id).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match client_id {
                    Some(client_id) => {
                        self.send_packet(
                            Packet::Connected {
                                client_id,
                                server_time: self.world.session().now(),
                            },
                            addr,
                        );
                        for packet in self.world.client_connected(client_id) {
                            self.send_packet(packet, addr);
                        }
                    }
                    None => {
                        self.send_packet(
                            Packet::Disconnected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::Request { target, request } => {
                let Some(client_id) = self.client_at(addr).await else {
                    debug!("Request from unknown address {}", addr);
                    return;
                };
                let name = request.name();
                if let Err(e) = self.world.handle_request(client_id, target, request) {
                    debug!("Dropped {} from client {} on {}: {}", name, client_id, target, e);
                }
            }

            Packet::Heartbeat => {
                self.client_at(addr).await;
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    self.drop_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Routes everything the world produced this tick.
    async fn flush_outbox(&mut self) {
        let outgoing = self.world.session_mut().drain_outbox();
        if outgoing.is_empty() {
            return;
        }

        let clients = self.clients.read().await;
        for message in outgoing {
            match message.into_packet() {
                (Some(client_id), packet) => match clients.addr_of(client_id) {
                    Some(addr) => self.send_packet(packet, addr),
                    None => debug!("Client {} gone, dropping targeted packet", client_id),
                },
                (None, packet) => self.broadcast_packet(packet, None),
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.world.client_disconnected(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.world.tick(dt);
                    self.tick += 1;
                    if self.tick % CLOCK_SYNC_TICKS == 0 {
                        let server_time = self.world.session().now();
                        self.broadcast_packet(Packet::Clock { server_time }, None);
                    }
                    self.flush_outbox().await;

                    if self.tick % 60 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {} entities, {:.1}Hz",
                                   self.tick, client_count, self.world.entity_count(), 1.0 / dt);
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{EntityId, GameMode, Request};
    use std::net::{IpAddr, Ipv4Addr};

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    async fn create_test_server(max_clients: usize) -> Server {
        let config = ServerConfig {
            max_clients,
            seed: Some(1),
            ..ServerConfig::default()
        };
        Server::new("127.0.0.1:0", config, SceneLayout::default())
            .await
            .unwrap()
    }

    fn queued(server: &mut Server) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_server_message_creation() {
        let addr = peer(8080);
        let msg = ServerMessage::PacketReceived {
            packet: Packet::Heartbeat,
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr);
                assert_eq!(packet, Packet::Heartbeat);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        assert!(tx.send(ServerMessage::ClientTimeout { client_id: 42 }).is_ok());

        match rx.try_recv() {
            Ok(ServerMessage::ClientTimeout { client_id }) => assert_eq!(client_id, 42),
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_connect_sends_id_then_snapshot() {
        let mut server = create_test_server(4).await;
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                peer(9000),
            )
            .await;

        let messages = queued(&mut server);
        match &messages[0] {
            GameMessage::SendPacket {
                packet: Packet::Connected { client_id, .. },
                addr,
            } => {
                assert_eq!(*client_id, 1);
                assert_eq!(*addr, peer(9000));
            }
            other => panic!("Expected Connected, got {:?}", other),
        }
        assert!(messages.iter().any(|m| matches!(
            m,
            GameMessage::SendPacket {
                packet: Packet::Spawn { .. },
                ..
            }
        )));
        assert!(server.world().session().is_connected(1));
    }

    #[tokio::test]
    async fn test_version_mismatch_and_full_server() {
        let mut server = create_test_server(1).await;
        server
            .handle_packet(Packet::Connect { client_version: 99 }, peer(9001))
            .await;
        assert!(matches!(
            queued(&mut server).as_slice(),
            [GameMessage::SendPacket {
                packet: Packet::Disconnected { .. },
                ..
            }]
        ));

        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                peer(9002),
            )
            .await;
        queued(&mut server);

        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                peer(9003),
            )
            .await;
        match queued(&mut server).as_slice() {
            [GameMessage::SendPacket {
                packet: Packet::Disconnected { reason },
                ..
            }] => assert_eq!(reason, "Server full"),
            other => panic!("Expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requests_reach_world_and_outbox_is_routed() {
        let mut server = create_test_server(4).await;
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                peer(9004),
            )
            .await;
        queued(&mut server);

        server
            .handle_packet(
                Packet::Request {
                    target: EntityId(1),
                    request: Request::PickMode {
                        mode: GameMode::Teams,
                    },
                },
                peer(9004),
            )
            .await;
        assert_eq!(server.world().lobby().pick_count(), 1);

        server.flush_outbox().await;
        let messages = queued(&mut server);
        assert!(messages.iter().any(|m| matches!(
            m,
            GameMessage::BroadcastPacket {
                packet: Packet::Broadcast { .. },
                exclude: None,
            }
        )));
    }

    #[tokio::test]
    async fn test_disconnect_clears_session() {
        let mut server = create_test_server(4).await;
        let addr = peer(9005);
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                addr,
            )
            .await;
        server.handle_packet(Packet::Disconnect, addr).await;

        assert!(!server.world().session().is_connected(1));
        assert!(server.clients.read().await.is_empty());
    }
}
