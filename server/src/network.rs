//! Server network layer: owns the UDP socket and drives the dispatcher

use crate::dispatcher::{MessageDispatcher, Outgoing};
use crate::gateway::ConnectionGateway;
use crate::pool::BufferPool;
use crate::world::World;
use log::{debug, error, info, warn};
use shared::transport::{MAX_DATAGRAM_SIZE, RESEND_INTERVAL};
use shared::Packet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

const POOLED_BUFFERS: usize = 16;

/// Single-task server: the socket, connection set, world and buffer pool are
/// all owned by the loop in [`Server::run`].
pub struct Server {
    socket: UdpSocket,
    dispatcher: MessageDispatcher,
    pool: BufferPool,
    maintenance_interval: Duration,
}

impl Server {
    pub async fn new(
        addr: &str,
        world: World,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Server listening on {}", socket.local_addr()?);

        Ok(Server {
            socket,
            dispatcher: MessageDispatcher::new(ConnectionGateway::new(), world, max_clients),
            pool: BufferPool::new(MAX_DATAGRAM_SIZE, POOLED_BUFFERS),
            maintenance_interval: RESEND_INTERVAL,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn send_all(&self, outgoing: Outgoing) {
        for (packet, addr) in outgoing {
            if let Err(e) = Self::send_packet_impl(&self.socket, &packet, addr).await {
                error!("Failed to send packet to {}: {}", addr, e);
            }
        }
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Decodes and dispatches one datagram, then hands its buffer back to the pool.
    async fn handle_datagram(&mut self, buffer: Vec<u8>, len: usize, addr: SocketAddr) {
        let outgoing = match Packet::decode(&buffer[..len]) {
            Ok(packet) => self.dispatcher.dispatch(packet, addr, Instant::now()),
            Err(e) => {
                warn!("Failed to deserialize packet from {}: {}", addr, e);
                Vec::new()
            }
        };
        self.pool.recycle(buffer);
        self.send_all(outgoing).await;
    }

    /// Main server loop: receives datagrams and runs periodic maintenance
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut maintenance = interval(self.maintenance_interval);

        info!("Server started successfully");

        loop {
            let mut buffer = self.pool.take();

            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    match received {
                        Ok((len, addr)) => self.handle_datagram(buffer, len, addr).await,
                        Err(e) => {
                            // ICMP port-unreachable from a vanished peer surfaces here on some platforms
                            debug!("Error receiving packet: {}", e);
                            self.pool.recycle(buffer);
                        }
                    }
                },

                _ = maintenance.tick() => {
                    self.pool.recycle(buffer);
                    let outgoing = self.dispatcher.maintain(Instant::now());
                    self.send_all(outgoing).await;
                },
            }
        }
    }
}
