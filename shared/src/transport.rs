//! Datagram envelope and reliable ordered delivery over UDP.
//!
//! Every datagram carries exactly one bincode-encoded [`Packet`]. Messages that
//! need ordered, reliable delivery go through a [`ReliableChannel`], which
//! splits them into sequenced fragments, keeps each fragment until the peer
//! acknowledges it, and reassembles incoming fragments strictly in order.
//!
//! Both directions are bounded: at most [`MAX_IN_FLIGHT`] fragments wait for
//! acknowledgement, each is resent at most [`MAX_RESENDS`] times, only
//! [`RECEIVE_WINDOW`] fragments ahead of the next expected one are held, and a
//! message growing past [`MAX_MESSAGE_SIZE`] is discarded.

use crate::protocol::MAX_WORLD_SIZE;
use bincode::{deserialize, serialize};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Largest application chunk carried by one reliable fragment.
pub const FRAGMENT_SIZE: usize = 1024;

/// How long an unacknowledged fragment waits before it is sent again.
pub const RESEND_INTERVAL: Duration = Duration::from_millis(200);

/// Receive buffer size; comfortably above one encoded fragment.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// How many fragments past the next expected one are held for reordering.
pub const RECEIVE_WINDOW: u32 = 64;

/// Largest reassembled message: a full world frame (tag plus u16 length plus body).
pub const MAX_MESSAGE_SIZE: usize = MAX_WORLD_SIZE + 3;

/// Unacknowledged fragments a channel keeps before refusing new messages.
/// Fits one full world frame with room to spare.
pub const MAX_IN_FLIGHT: usize = 128;

/// Resends of one fragment before the channel gives up on the peer.
pub const MAX_RESENDS: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("send backlog full: {in_flight} fragments in flight, {needed} more requested")]
    Backlog { in_flight: usize, needed: usize },

    #[error("fragment {sequence} is outside the receive window starting at {expected}")]
    OutOfWindow { sequence: u32, expected: u32 },
}

/// Sequencing header of a reliable fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequenced {
    pub sequence: u32,
    /// Set on the last fragment of a message.
    pub final_fragment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    // Connection management
    ConnectionApproval { payload: Vec<u8> },
    Approved,
    Denied { reason: String },
    Heartbeat,
    Disconnect,

    // Application data
    Data {
        reliable: Option<Sequenced>,
        payload: Vec<u8>,
    },
    Ack { sequence: u32 },

    // Diagnostics
    DebugMessage { text: String },
    DiscoveryRequest,
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, bincode::Error> {
        deserialize(bytes)
    }

    /// Unsequenced, fire-and-forget data.
    pub fn unreliable(payload: Vec<u8>) -> Packet {
        Packet::Data {
            reliable: None,
            payload,
        }
    }
}

#[derive(Debug)]
struct Unacked {
    packet: Packet,
    last_sent: Instant,
    resends: u32,
}

/// Per-peer state for reliable ordered delivery in both directions.
#[derive(Debug, Default)]
pub struct ReliableChannel {
    next_outgoing: u32,
    unacked: BTreeMap<u32, Unacked>,

    next_incoming: u32,
    held: BTreeMap<u32, (bool, Vec<u8>)>,
    partial: Vec<u8>,
    /// Set while the rest of an oversized message is being skipped.
    discarding: bool,
}

impl ReliableChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `payload` for reliable delivery and returns the fragments to transmit now.
    ///
    /// Nothing is queued if the fragments would push the backlog past [`MAX_IN_FLIGHT`].
    pub fn send(&mut self, payload: &[u8], now: Instant) -> Result<Vec<Packet>, ChannelError> {
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(FRAGMENT_SIZE).collect()
        };

        if self.unacked.len() + chunks.len() > MAX_IN_FLIGHT {
            return Err(ChannelError::Backlog {
                in_flight: self.unacked.len(),
                needed: chunks.len(),
            });
        }

        let last = chunks.len() - 1;
        let mut packets = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.into_iter().enumerate() {
            let sequence = self.next_outgoing;
            self.next_outgoing = self.next_outgoing.wrapping_add(1);

            let packet = Packet::Data {
                reliable: Some(Sequenced {
                    sequence,
                    final_fragment: i == last,
                }),
                payload: chunk.to_vec(),
            };

            self.unacked.insert(
                sequence,
                Unacked {
                    packet: packet.clone(),
                    last_sent: now,
                    resends: 0,
                },
            );
            packets.push(packet);
        }

        Ok(packets)
    }

    /// Releases a fragment the peer has confirmed. Unknown sequences are ignored.
    pub fn acknowledge(&mut self, sequence: u32) -> bool {
        self.unacked.remove(&sequence).is_some()
    }

    /// Returns fragments whose resend interval has elapsed, marking them as sent.
    /// Fragments that used up [`MAX_RESENDS`] are left alone.
    pub fn due_for_resend(&mut self, now: Instant) -> Vec<Packet> {
        self.unacked
            .values_mut()
            .filter(|pending| {
                pending.resends < MAX_RESENDS
                    && now.duration_since(pending.last_sent) >= RESEND_INTERVAL
            })
            .map(|pending| {
                pending.last_sent = now;
                pending.resends += 1;
                pending.packet.clone()
            })
            .collect()
    }

    /// True once some fragment has been resent [`MAX_RESENDS`] times and its
    /// last copy has also gone unacknowledged for a full interval.
    pub fn stalled(&self, now: Instant) -> bool {
        self.unacked.values().any(|pending| {
            pending.resends >= MAX_RESENDS
                && now.duration_since(pending.last_sent) >= RESEND_INTERVAL
        })
    }

    /// Number of fragments still waiting for acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.unacked.len()
    }

    /// Accepts an incoming fragment and returns every message it completes, in order.
    ///
    /// Fragments already delivered come back as an empty list and should still be
    /// acknowledged. Fragments too far ahead are refused and must not be.
    pub fn receive(
        &mut self,
        header: Sequenced,
        chunk: Vec<u8>,
    ) -> Result<Vec<Vec<u8>>, ChannelError> {
        let ahead = header.sequence.wrapping_sub(self.next_incoming);
        if ahead > u32::MAX / 2 {
            return Ok(Vec::new());
        }
        if ahead >= RECEIVE_WINDOW {
            return Err(ChannelError::OutOfWindow {
                sequence: header.sequence,
                expected: self.next_incoming,
            });
        }

        self.held
            .entry(header.sequence)
            .or_insert((header.final_fragment, chunk));

        let mut delivered = Vec::new();
        while let Some((final_fragment, chunk)) = self.held.remove(&self.next_incoming) {
            self.next_incoming = self.next_incoming.wrapping_add(1);

            if !self.discarding && self.partial.len() + chunk.len() > MAX_MESSAGE_SIZE {
                warn!("Discarding message larger than {} bytes", MAX_MESSAGE_SIZE);
                self.discarding = true;
                self.partial = Vec::new();
            }
            if !self.discarding {
                self.partial.extend_from_slice(&chunk);
            }

            if final_fragment {
                if self.discarding {
                    self.discarding = false;
                } else {
                    delivered.push(std::mem::take(&mut self.partial));
                }
            }
        }
        Ok(delivered)
    }
}
