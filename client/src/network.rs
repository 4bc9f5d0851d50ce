//! Client network layer: UDP transport around the observer state

use crate::game::ObserverState;
use crate::input::{BotInput, InputFrame, InputManager};
use crate::presentation::LogPresentation;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Color, GameMode, Packet, Request, SceneLayout, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

const FRAME: Duration = Duration::from_millis(16);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const SERVER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub server: String,
    pub fake_ping_ms: u64,
    pub mode: GameMode,
    /// `Color::RANDOM_SENTINEL` lets the authority pick.
    pub color: Color,
    pub bot: bool,
    pub seed: Option<u64>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:8080".to_string(),
            fake_ping_ms: 0,
            mode: GameMode::FreeForAll,
            color: Color::RANDOM_SENTINEL,
            bot: false,
            seed: None,
        }
    }
}

/// Join steps the client walks through once connected.
#[derive(Debug, Default)]
struct JoinProgress {
    picked: bool,
    spawn_requested: bool,
    color_sent: bool,
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    options: ClientOptions,

    state: ObserverState,
    presentation: LogPresentation,
    input: InputManager,
    bot: Option<BotInput>,
    join: JoinProgress,

    last_heartbeat: Instant,
    last_packet: Instant,
}

impl Client {
    pub async fn new(options: ClientOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = options.server.parse()?;
        let bot = options.bot.then(|| BotInput::new(options.seed));

        Ok(Client {
            socket,
            server_addr,
            state: ObserverState::new(SceneLayout::default()),
            presentation: LogPresentation::default(),
            input: InputManager::new(),
            bot,
            join: JoinProgress::default(),
            last_heartbeat: Instant::now(),
            last_packet: Instant::now(),
            options,
        })
    }

    pub fn state(&self) -> &ObserverState {
        &self.state
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.options.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {}...", self.server_addr);
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await
    }

    /// Decodes and applies one datagram from the server.
    pub fn handle_datagram(&mut self, data: &[u8]) {
        match deserialize::<Packet>(data) {
            Ok(packet) => {
                self.last_packet = Instant::now();
                if matches!(packet, Packet::Disconnected { .. }) {
                    self.join = JoinProgress::default();
                }
                self.state.apply_packet(packet, &mut self.presentation);
            }
            Err(e) => warn!("Malformed packet from server: {}", e),
        }
    }

    /// Queues the next join request, if one is due.
    fn advance_join(&mut self) {
        let Some((lobby, _)) = self.state.lobby() else {
            return;
        };

        if !self.join.picked {
            let mode = self.options.mode;
            if self.state.request(lobby, Request::PickMode { mode }).is_ok() {
                info!("Picked {:?}", mode);
                self.join.picked = true;
            }
            return;
        }

        match self.state.my_player() {
            None if self.state.game_started() && !self.join.spawn_requested => {
                if self.state.request(lobby, Request::RequestSpawn).is_ok() {
                    self.join.spawn_requested = true;
                }
            }
            Some(me) if !self.join.color_sent => {
                let color = self.options.color;
                if self.state.request(me, Request::RequestColorChange { color }).is_ok() {
                    self.join.color_sent = true;
                }
            }
            _ => {}
        }
    }

    /// Runs one client frame and returns the packets it produced.
    pub fn frame(&mut self, dt: f32, frame: InputFrame) -> Vec<Packet> {
        self.state.tick(dt);
        if !self.state.is_connected() {
            return Vec::new();
        }

        self.advance_join();

        let actions = self.input.update(frame, self.state.now());
        for request in actions.requests {
            if let Err(e) = self.state.request_for_me(request) {
                debug!("Input dropped: {}", e);
            }
        }
        if actions.interact {
            if let Err(e) = self.state.interact() {
                debug!("Interact dropped: {}", e);
            }
        }

        let mut packets: Vec<Packet> = self
            .state
            .drain_requests()
            .into_iter()
            .map(|(target, request)| Packet::Request { target, request })
            .collect();

        if self.last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
            self.last_heartbeat = Instant::now();
            packets.push(Packet::Heartbeat);
        }
        packets
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut frame_interval = interval(FRAME);
        let mut last_frame = Instant::now();
        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.options.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
                            }
                            self.handle_datagram(&buffer[..len]);
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                }

                _ = frame_interval.tick() => {
                    let dt = last_frame.elapsed().as_secs_f32();
                    last_frame = Instant::now();

                    let now = self.state.now();
                    let input = match self.bot.as_mut() {
                        Some(bot) => bot.next_frame(now),
                        None => InputFrame::default(),
                    };

                    for packet in self.frame(dt, input) {
                        if let Err(e) = self.send_packet(&packet).await {
                            error!("Error sending packet: {}", e);
                        }
                    }

                    if self.last_packet.elapsed() >= SERVER_TIMEOUT {
                        warn!("No packets from server for {:?}, giving up", SERVER_TIMEOUT);
                        break;
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        if self.state.is_connected() {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{EntityId, EntityKind};

    async fn client_and_server() -> (Client, UdpSocket) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let options = ClientOptions {
            server: server.local_addr().unwrap().to_string(),
            mode: GameMode::Teams,
            ..Default::default()
        };
        (Client::new(options).await.unwrap(), server)
    }

    fn deliver(client: &mut Client, packet: Packet) {
        client.handle_datagram(&serialize(&packet).unwrap());
    }

    #[tokio::test]
    async fn test_connect_sends_protocol_version() {
        let (mut client, server) = client_and_server().await;
        client.connect().await.unwrap();

        let mut buffer = [0u8; 256];
        let (len, _) = server.recv_from(&mut buffer).await.unwrap();
        assert_eq!(
            deserialize::<Packet>(&buffer[..len]).unwrap(),
            Packet::Connect {
                client_version: PROTOCOL_VERSION
            }
        );
    }

    #[tokio::test]
    async fn test_join_sequence() {
        let (mut client, _server) = client_and_server().await;
        assert!(client.frame(0.016, InputFrame::default()).is_empty());

        deliver(
            &mut client,
            Packet::Connected {
                client_id: 2,
                server_time: 1.0,
            },
        );
        deliver(
            &mut client,
            Packet::Spawn {
                entity: EntityId(1),
                kind: EntityKind::Lobby,
                owner: None,
            },
        );

        let packets = client.frame(0.016, InputFrame::default());
        assert_eq!(
            packets,
            vec![Packet::Request {
                target: EntityId(1),
                request: Request::PickMode {
                    mode: GameMode::Teams
                }
            }]
        );

        deliver(
            &mut client,
            Packet::Broadcast {
                entity: EntityId(1),
                event: shared::Broadcast::LoadScene {
                    scene: 1,
                    additive: false,
                },
            },
        );
        let packets = client.frame(0.016, InputFrame::default());
        assert_eq!(
            packets,
            vec![Packet::Request {
                target: EntityId(1),
                request: Request::RequestSpawn
            }]
        );

        deliver(
            &mut client,
            Packet::Spawn {
                entity: EntityId(9),
                kind: EntityKind::Player,
                owner: Some(2),
            },
        );
        let packets = client.frame(0.016, InputFrame::default());
        assert_eq!(
            packets,
            vec![Packet::Request {
                target: EntityId(9),
                request: Request::RequestColorChange {
                    color: Color::RANDOM_SENTINEL
                }
            }]
        );
    }

    #[test]
    fn test_malformed_datagram_is_ignored() {
        let (mut client, _server) = tokio_test::block_on(client_and_server());
        client.handle_datagram(&[0xff, 0xff, 0xff]);
        assert!(!client.state().is_connected());
    }
}
