//! Server network layer handling UDP communications and the authority loop

use crate::authority::{Authority, Outbound};
use crate::client_manager::ClientManager;
use log::{debug, error, info, warn};
use shared::{decode, encode, BoxError, Packet, PeerId, ProtocolError, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: PeerId },
    Shutdown,
}

/// Messages sent from the authority loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<PeerId>,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interval between transform replication flushes
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Movement speed handed to every spawned entity
    pub player_speed: f32,
    /// Seed for spawn positions
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(33),
            max_clients: 8,
            player_speed: shared::DEFAULT_PLAYER_SPEED,
            seed: None,
        }
    }
}

/// Asks a running server to stop the session and exit its loop
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if let Err(e) = self.server_tx.send(ServerMessage::Shutdown) {
            warn!("Server already stopped: {}", e);
        }
    }
}

/// Main server coordinating networking and the authority
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    authority: Authority,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            authority: Authority::new(config.player_speed, config.seed),
            tick_duration: config.tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[0..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Server loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
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
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

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
                                error!("Failed to send to peer {}: {}", client_id, e);
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
                if server_tx.is_closed() {
                    break;
                }

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
    ) -> Result<(), BoxError> {
        let data = encode(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Routes authority output to the sender task
    async fn dispatch(&self, out: Vec<Outbound>) {
        for message in out {
            let queued = match message {
                Outbound::Send { peer, packet } => {
                    let addr = {
                        let clients = self.clients.read().await;
                        clients.addr_of(peer)
                    };
                    match addr {
                        Some(addr) => self.game_tx.send(GameMessage::SendPacket { packet, addr }),
                        None => {
                            debug!("Dropping {} for departed peer {}", packet.kind(), peer);
                            continue;
                        }
                    }
                }
                Outbound::Broadcast { packet, exclude } => self
                    .game_tx
                    .send(GameMessage::BroadcastPacket { packet, exclude }),
            };

            if let Err(e) = queued {
                error!("Failed to queue outbound packet: {}", e);
            }
        }
    }

    async fn handle_connect(
        &mut self,
        client_version: u32,
        name: String,
        host: bool,
        addr: SocketAddr,
    ) {
        info!(
            "Peer connecting from {} (version: {}, host: {})",
            addr, client_version, host
        );

        if client_version != PROTOCOL_VERSION {
            let err = ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: client_version,
            };
            warn!("Rejecting {}: {}", addr, err);
            self.send_packet(
                Packet::Disconnected {
                    reason: err.to_string(),
                },
                addr,
            );
            return;
        }

        // Remove existing connection if present
        let existing = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };
        if let Some(existing_id) = existing {
            info!("Replacing existing peer {} from {}", existing_id, addr);
            self.drop_peer(existing_id).await;
        }

        let (client_id, max_clients) = {
            let mut clients = self.clients.write().await;
            (clients.add_client(addr, name), clients.max_clients())
        };

        let Some(client_id) = client_id else {
            let err = ProtocolError::ServerFull { max: max_clients };
            warn!("Rejecting {}: {}", addr, err);
            self.send_packet(
                Packet::Disconnected {
                    reason: err.to_string(),
                },
                addr,
            );
            return;
        };

        match self.authority.join(client_id, host) {
            Ok(out) => self.dispatch(out).await,
            Err(err) => {
                warn!("Rejecting peer {}: {}", client_id, err);
                {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                }
                self.send_packet(
                    Packet::Disconnected {
                        reason: err.to_string(),
                    },
                    addr,
                );
            }
        }
    }

    /// Removes a peer from both the connection table and the session
    async fn drop_peer(&mut self, client_id: PeerId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        let out = self.authority.leave(client_id);
        self.dispatch(out).await;
    }

    /// Processes incoming packets and applies commands to the authority
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect {
            client_version,
            name,
            host,
        } = packet
        {
            self.handle_connect(client_version, name, host, addr).await;
            return;
        }

        // Authority-bound traffic only; stray broadcasts never refresh a peer
        if !packet.is_command() {
            warn!("Ignoring {} from {}: not a command", packet.kind(), addr);
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let id = clients.find_client_by_addr(addr);
            if let Some(id) = id {
                clients.touch(id);
            }
            id
        };

        let Some(client_id) = client_id else {
            warn!("{} packet from unknown address {}", packet.kind(), addr);
            return;
        };

        if let Packet::Disconnect = packet {
            self.drop_peer(client_id).await;
            return;
        }

        match self.authority.handle_command(client_id, packet) {
            Ok(out) => self.dispatch(out).await,
            Err(e) => warn!("Rejected command from peer {}: {}", client_id, e),
        }
    }

    /// Stops the session and notifies every peer before the loop exits.
    ///
    /// Packets are sent directly rather than queued so they leave before the
    /// sender task is dropped with the server.
    async fn shutdown(&mut self) {
        let out = self.authority.stop();
        let client_addrs = {
            let clients = self.clients.read().await;
            clients.get_client_addrs()
        };

        for message in out {
            let (packet, exclude) = match message {
                Outbound::Broadcast { packet, exclude } => (packet, exclude),
                Outbound::Send { peer, packet } => (packet, Some(peer)),
            };

            for (client_id, addr) in &client_addrs {
                if Some(*client_id) == exclude {
                    continue;
                }
                if let Err(e) = Self::send_packet_impl(&self.socket, &packet, *addr).await {
                    error!("Failed to notify peer {} of shutdown: {}", client_id, e);
                }
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), BoxError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut tick: u64 = 0;

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
                            info!("Peer {} timed out", client_id);
                            let out = self.authority.leave(client_id);
                            self.dispatch(out).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            self.shutdown().await;
                            break;
                        }
                    }
                },

                // Replicate transforms once per tick
                _ = tick_interval.tick() => {
                    tick += 1;
                    let out = self.authority.flush_transforms();
                    if !out.is_empty() {
                        self.dispatch(out).await;
                    }

                    if tick % 300 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            let session = self.authority.session();
                            debug!("Tick {}: {} peers, player {:?}, rating {}",
                                   tick, client_count, session.active_player(), session.rating());
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
