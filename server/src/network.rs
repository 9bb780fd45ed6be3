//! Server network layer handling UDP communications and game loop coordination

use crate::catalog::Catalog;
use crate::client_manager::ClientManager;
use crate::config::Config;
use crate::error::ProtocolError;
use crate::game::GameState;
use crate::outbox::Outgoing;
use crate::scheduler::TokioScheduler;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks and timers to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    /// A masking retry timer fired for this client.
    RetryInventory { client_id: u32 },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState<TokioScheduler>,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        catalog: Arc<Catalog>,
        config: Config,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(server_tx.clone());

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state: GameState::new(catalog, config, scheduler),
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop the main loop with [`ServerMessage::Shutdown`].
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
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

    /// Spawns task that processes outgoing packet queue
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

    /// Spawns task that monitors client timeouts
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

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Hands everything the game queued to the sender task
    async fn flush_outbox(&mut self) {
        let queued = self.game_state.drain_outbox();
        if queued.is_empty() {
            return;
        }

        let clients = self.clients.read().await;
        for outgoing in queued {
            match outgoing {
                Outgoing::Send { client_id, packet } => match clients.addr_of(client_id) {
                    Some(addr) => self.send_packet(packet, addr),
                    None => debug!("Dropping packet for departed client {}", client_id),
                },
                Outgoing::Broadcast { packet, exclude } => self.broadcast_packet(packet, exclude),
            }
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };

        let Some(client_id) = client_id else {
            warn!("Packet from unknown address {}", addr);
            return;
        };

        if let Packet::Disconnect = packet {
            self.clients.write().await.remove_client(&client_id);
            self.game_state.remove_player(client_id);
            return;
        }

        if let Err(e) = self.apply_packet(client_id, packet) {
            warn!("Discarding packet from client {}: {}", client_id, e);
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        // Remove existing connection if present
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };

        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            let mut clients = self.clients.write().await;
            clients.remove_client(&existing_id);
            self.game_state.remove_player(existing_id);
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };

        if let Some(client_id) = client_id {
            self.game_state.add_player(client_id);
            self.send_packet(Packet::Connected { client_id }, addr);
        } else {
            let response = Packet::Disconnected {
                reason: "Server full".to_string(),
            };
            self.send_packet(response, addr);
        }
    }

    /// Routes a packet from a known client into the game state
    fn apply_packet(&mut self, client_id: u32, packet: Packet) -> Result<(), ProtocolError> {
        match packet {
            Packet::PlayerUpdate {
                position,
                velocity,
                release_use_item,
            } => self
                .game_state
                .update_player(client_id, position, velocity, release_use_item),
            Packet::TogglePvp { hostile } => self.game_state.set_hostile(client_id, hostile),
            Packet::InventorySlot { slot, item } => {
                self.game_state.set_inventory_slot(client_id, slot, item)
            }
            Packet::ProjectileNew { state, source_item } => self
                .game_state
                .spawn_projectile(client_id, state, source_item)
                .map(|outcome| debug!("Spawn from client {}: {:?}", client_id, outcome)),
            Packet::KillProjectile { identity } => self
                .game_state
                .kill_projectile(client_id, identity)
                .map(|_| ()),
            Packet::ItemOwner { drop_index, .. } => {
                self.game_state.acknowledge_ping(client_id, drop_index)
            }
            other => {
                warn!("Unexpected packet type from client {}: {:?}", client_id, other);
                Ok(())
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events and timers
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.game_state.remove_player(client_id);
                        },
                        Some(ServerMessage::RetryInventory { client_id }) => {
                            self.game_state.retry_inventory(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.game_state.update();

                    // Periodic monitoring
                    if self.game_state.tick % 60 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {} live projectiles",
                                self.game_state.tick,
                                client_count,
                                self.game_state.projectiles.active_count()
                            );
                        }
                    }
                },
            }

            self.flush_outbox().await;
        }

        Ok(())
    }
}
