//! Per-datagram message handling.
//!
//! The dispatcher owns the connection set and the world and turns one decoded
//! packet into the packets to send back. It never touches the socket, so the
//! whole protocol can be driven synchronously in tests.

use crate::client_manager::{ClientManager, Connection, CONNECTION_TIMEOUT};
use crate::gateway::{Approval, ConnectionGateway};
use crate::world::World;
use log::{debug, info, warn};
use shared::{MessageType, Packet};
use std::net::SocketAddr;
use std::time::Instant;

/// Packets to transmit and where to.
pub type Outgoing = Vec<(Packet, SocketAddr)>;

pub const SERVER_FULL: &str = "server full";

pub struct MessageDispatcher {
    gateway: ConnectionGateway,
    world: World,
    clients: ClientManager,
}

impl MessageDispatcher {
    pub fn new(gateway: ConnectionGateway, world: World, max_clients: usize) -> Self {
        Self {
            gateway,
            world,
            clients: ClientManager::new(max_clients),
        }
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn dispatch(&mut self, packet: Packet, addr: SocketAddr, now: Instant) -> Outgoing {
        match packet {
            Packet::ConnectionApproval { payload } => self.handle_approval(&payload, addr, now),

            Packet::Data { reliable, payload } => {
                let Some(client_id) = self.clients.find_client_by_addr(addr) else {
                    warn!("Dropping data from unapproved peer {}", addr);
                    return Vec::new();
                };
                let Some(connection) = self.clients.get_mut(client_id) else {
                    return Vec::new();
                };
                connection.touch(now);

                let mut outgoing = Vec::new();
                let messages = match reliable {
                    // Duplicates are acked again but come back out of the channel empty
                    Some(header) => match connection.channel.receive(header, payload) {
                        Ok(messages) => {
                            outgoing.push((Packet::Ack { sequence: header.sequence }, addr));
                            messages
                        }
                        Err(e) => {
                            debug!("Client {}: {}", connection.id, e);
                            Vec::new()
                        }
                    },
                    None => vec![payload],
                };

                for message in messages {
                    for reply in Self::handle_message(&self.world, connection, &message, now) {
                        outgoing.push((reply, addr));
                    }
                }
                outgoing
            }

            Packet::Ack { sequence } => {
                if let Some(connection) = self.connection_mut(addr, now) {
                    connection.channel.acknowledge(sequence);
                }
                Vec::new()
            }

            Packet::Heartbeat => {
                self.connection_mut(addr, now);
                Vec::new()
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.clients.find_client_by_addr(addr) {
                    self.clients.remove_client(&client_id);
                }
                Vec::new()
            }

            Packet::DebugMessage { text } => {
                debug!("Debug message from {}: {}", addr, text);
                Vec::new()
            }

            Packet::DiscoveryRequest => Vec::new(),

            Packet::Approved | Packet::Denied { .. } => {
                warn!("Unexpected packet type from client at {}", addr);
                Vec::new()
            }
        }
    }

    /// Resends overdue reliable fragments and drops idle or unresponsive connections.
    pub fn maintain(&mut self, now: Instant) -> Outgoing {
        for client_id in self.clients.check_timeouts(now, CONNECTION_TIMEOUT) {
            info!("Client {} timed out", client_id);
        }
        for client_id in self.clients.check_stalled(now) {
            info!("Client {} stopped acknowledging, dropping", client_id);
        }

        let mut outgoing = Vec::new();
        for connection in self.clients.connections_mut() {
            let addr = connection.addr;
            outgoing.extend(
                connection
                    .channel
                    .due_for_resend(now)
                    .into_iter()
                    .map(|packet| (packet, addr)),
            );
        }
        outgoing
    }

    fn handle_approval(&mut self, payload: &[u8], addr: SocketAddr, now: Instant) -> Outgoing {
        info!("Client connecting from {}", addr);

        let request = match self.gateway.handle_approval(payload) {
            Approval::Approve(request) => request,
            Approval::Deny(reason) => {
                info!("Denied connection from {}: {}", addr, reason);
                return vec![(Packet::Denied { reason }, addr)];
            }
        };

        if let Some(existing_id) = self.clients.find_client_by_addr(addr) {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.clients.remove_client(&existing_id);
        }

        match self.clients.add_client(addr, request, now) {
            Some(_) => vec![(Packet::Approved, addr)],
            None => vec![(
                Packet::Denied {
                    reason: SERVER_FULL.to_string(),
                },
                addr,
            )],
        }
    }

    fn handle_message(
        world: &World,
        connection: &mut Connection,
        message: &[u8],
        now: Instant,
    ) -> Vec<Packet> {
        match message.first().copied().and_then(MessageType::from_u8) {
            Some(MessageType::MsgWorld) => {
                // One transfer at a time; repeats while it is unacknowledged are dropped
                if connection.channel.in_flight() > 0 {
                    debug!(
                        "World transfer to client {} already in flight",
                        connection.id
                    );
                    return Vec::new();
                }

                debug!(
                    "Sending world ({} bytes) to client {}",
                    world.len(),
                    connection.id
                );
                match connection.channel.send(&world.frame(), now) {
                    Ok(packets) => packets,
                    Err(e) => {
                        warn!("Cannot send world to client {}: {}", connection.id, e);
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        }
    }

    fn connection_mut(&mut self, addr: SocketAddr, now: Instant) -> Option<&mut Connection> {
        let client_id = self.clients.find_client_by_addr(addr)?;
        let connection = self.clients.get_mut(client_id)?;
        connection.touch(now);
        Some(connection)
    }
}
