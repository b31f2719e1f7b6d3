//! The server's active connection set.
//!
//! Only handshakes the gateway approved end up here. Each connection carries
//! the identity it announced, its network address, when it was last heard
//! from, and its reliable channel state.

use log::info;
use shared::protocol::{EnterRequest, Team};
use shared::ReliableChannel;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Approved connections idle for longer than this are dropped.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// An approved peer.
#[derive(Debug)]
pub struct Connection {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    pub team: Team,
    pub callsign: String,
    pub tag: String,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    pub channel: ReliableChannel,
}

impl Connection {
    pub fn new(id: u32, addr: SocketAddr, request: EnterRequest, now: Instant) -> Self {
        Self {
            id,
            addr,
            team: request.team,
            callsign: request.callsign,
            tag: request.tag,
            last_seen: now,
            channel: ReliableChannel::new(),
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Owns every approved connection; mutated only by the dispatch loop.
pub struct ClientManager {
    clients: HashMap<u32, Connection>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers an approved handshake. Returns `None` when the server is full.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        request: EnterRequest,
        now: Instant,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!(
            "Client {} ({} on team {}) connected from {}",
            client_id, request.callsign, request.team, addr
        );
        self.clients
            .insert(client_id, Connection::new(client_id, addr, request, now));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} ({}) disconnected", client.id, client.callsign);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Connection> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut Connection> {
        self.clients.get_mut(&client_id)
    }

    pub fn connections_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.clients.values_mut()
    }

    /// Removes connections not heard from within `timeout`, returning their ids.
    pub fn check_timeouts(&mut self, now: Instant, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(now, timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Removes connections whose reliable channel gave up resending, returning their ids.
    pub fn check_stalled(&mut self, now: Instant) -> Vec<u32> {
        let stalled: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.channel.stalled(now))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &stalled {
            self.remove_client(client_id);
        }

        stalled
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
