use log::{debug, info, warn};
use shared::protocol::{decode_world_response, encode_world_request, EnterRequest};
use shared::transport::{MAX_DATAGRAM_SIZE, RESEND_INTERVAL};
use shared::{ChannelError, MessageType, Packet, ProtocolError, ReliableChannel};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep_until, timeout};

const HANDSHAKE_ATTEMPTS: u32 = 3;
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
const WORLD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server address '{0}'")]
    Address(String),

    #[error("connection denied: {0}")]
    Denied(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("not connected")]
    NotConnected,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Headless connection to an Angry Tanks server.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    channel: ReliableChannel,
    connected: bool,
    reply_timeout: Duration,
}

impl Client {
    pub async fn new(server_addr: &str) -> Result<Self, ClientError> {
        let server_addr: SocketAddr = server_addr
            .parse()
            .map_err(|_| ClientError::Address(server_addr.to_string()))?;

        let bind_addr = if server_addr.is_ipv6() {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        debug!("Client socket bound to {}", socket.local_addr()?);

        Ok(Client {
            socket,
            server_addr,
            channel: ReliableChannel::new(),
            connected: false,
            reply_timeout: REPLY_TIMEOUT,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        let data = packet.encode()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Next packet from the server; datagrams from anyone else are skipped.
    async fn recv_packet(&self, buffer: &mut [u8]) -> Result<Packet, ClientError> {
        loop {
            let (len, addr) = self.socket.recv_from(buffer).await?;
            if addr != self.server_addr {
                debug!("Ignoring datagram from {}", addr);
                continue;
            }
            match Packet::decode(&buffer[..len]) {
                Ok(packet) => return Ok(packet),
                Err(e) => warn!("Failed to deserialize packet from server: {}", e),
            }
        }
    }

    /// Acks and reassembles reliable data, releases acknowledged fragments, and
    /// returns the application messages `packet` completes.
    async fn handle_packet(&mut self, packet: Packet) -> Result<Vec<Vec<u8>>, ClientError> {
        let messages = match packet {
            Packet::Data {
                reliable: Some(header),
                payload,
            } => match self.channel.receive(header, payload) {
                Ok(messages) => {
                    self.send_packet(&Packet::Ack {
                        sequence: header.sequence,
                    })
                    .await?;
                    messages
                }
                Err(e) => {
                    debug!("{}", e);
                    Vec::new()
                }
            },
            Packet::Data {
                reliable: None,
                payload,
            } => vec![payload],
            Packet::Ack { sequence } => {
                self.channel.acknowledge(sequence);
                Vec::new()
            }
            Packet::DebugMessage { text } => {
                debug!("Server says: {}", text);
                Vec::new()
            }
            other => {
                debug!("Ignoring {:?}", other);
                Vec::new()
            }
        };
        Ok(messages)
    }

    /// Sends the handshake and waits for the verdict, retrying on silence.
    pub async fn connect(&mut self, request: &EnterRequest) -> Result<(), ClientError> {
        info!("Connecting to server {}...", self.server_addr);

        let handshake = Packet::ConnectionApproval {
            payload: request.encode(),
        };
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            self.send_packet(&handshake).await?;

            let deadline = Instant::now() + self.reply_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let packet = match timeout(remaining, self.recv_packet(&mut buffer)).await {
                    Ok(packet) => packet?,
                    Err(_) => break,
                };

                match packet {
                    Packet::Approved => {
                        info!("Connected as {} on team {}", request.callsign, request.team);
                        self.connected = true;
                        self.channel = ReliableChannel::new();
                        return Ok(());
                    }
                    Packet::Denied { reason } => {
                        warn!("Connection denied: {}", reason);
                        return Err(ClientError::Denied(reason));
                    }
                    other => debug!("Ignoring {:?} while connecting", other),
                }
            }

            debug!("No handshake reply (attempt {}/{})", attempt, HANDSHAKE_ATTEMPTS);
        }

        Err(ClientError::Timeout("handshake reply"))
    }

    /// Requests the world and returns the blob once every fragment has arrived.
    pub async fn fetch_world(&mut self) -> Result<Vec<u8>, ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }

        for packet in self.channel.send(&encode_world_request(), Instant::now())? {
            self.send_packet(&packet).await?;
        }

        let deadline = tokio::time::Instant::now() + WORLD_TIMEOUT;
        let mut resend = interval(RESEND_INTERVAL);
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                received = self.recv_packet(&mut buffer) => {
                    let messages = self.handle_packet(received?).await?;
                    for message in messages {
                        if message.first().copied().and_then(MessageType::from_u8)
                            == Some(MessageType::MsgWorld)
                        {
                            let world = decode_world_response(&message)?;
                            info!("Received world ({} bytes)", world.len());
                            return Ok(world);
                        }
                    }
                },

                _ = resend.tick() => {
                    for packet in self.channel.due_for_resend(Instant::now()) {
                        self.send_packet(&packet).await?;
                    }
                },

                _ = sleep_until(deadline) => {
                    return Err(ClientError::Timeout("world transfer"));
                },
            }
        }
    }

    /// Drains whatever the server has sent since the last call without waiting,
    /// acknowledging reliable data and resending overdue fragments.
    /// Returns how many datagrams were handled.
    pub async fn service(&mut self) -> Result<usize, ClientError> {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut handled = 0;

        loop {
            let (len, addr) = match self.socket.try_recv_from(&mut buffer) {
                Ok(received) => received,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            };
            if addr != self.server_addr {
                continue;
            }
            let packet = match Packet::decode(&buffer[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Failed to deserialize packet from server: {}", e);
                    continue;
                }
            };

            handled += 1;
            for message in self.handle_packet(packet).await? {
                debug!("Unhandled {}-byte message from server", message.len());
            }
        }

        for packet in self.channel.due_for_resend(Instant::now()) {
            self.send_packet(&packet).await?;
        }
        Ok(handled)
    }

    pub async fn heartbeat(&self) -> Result<(), ClientError> {
        self.send_packet(&Packet::Heartbeat).await
    }

    pub async fn send_debug(&self, text: &str) -> Result<(), ClientError> {
        self.send_packet(&Packet::DebugMessage {
            text: text.to_string(),
        })
        .await
    }

    pub async fn disconnect(&mut self) -> Result<(), ClientError> {
        if !self.connected {
            return Ok(());
        }
        self.send_packet(&Packet::Disconnect).await?;
        self.connected = false;
        info!("Disconnected from {}", self.server_addr);
        Ok(())
    }
}
