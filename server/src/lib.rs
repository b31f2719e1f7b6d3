//! # Angry Tanks Server Library
//!
//! The authoritative side of the protocol. It decides who may join, keeps the
//! set of approved connections, and serves the world blob to every client that
//! asks for it.
//!
//! ## Core Responsibilities
//!
//! ### Connection Approval
//! Every joining client sends a handshake carrying a protocol version and its
//! identity. The server checks the leading message tag and the version before
//! anything else and answers with an approval or a denial with a readable
//! reason. Denied peers are never registered.
//!
//! ### World Transfer
//! The world is loaded from disk once at startup and stays immutable. A client
//! requests it with a single-byte message and receives it framed with its
//! length, over reliable ordered delivery so that worlds larger than one
//! datagram arrive intact.
//!
//! ## Architecture Design
//!
//! ### Single-Task Event Loop
//! One task owns the socket, the connection set, the world and the receive
//! buffer pool. Each datagram is decoded, dispatched and answered before the
//! next one is read, so there is no shared mutable state and no locking.
//!
//! ### UDP-Based Communication
//! Every datagram carries one `Packet`. Reliability is layered on top per
//! connection: sequenced fragments, acknowledgements and periodic resends.
//!
//! ## Module Organization
//!
//! ### Gateway Module (`gateway`)
//! Validates handshakes and produces approvals or denials.
//!
//! ### Client Manager Module (`client_manager`)
//! Tracks approved connections, their identity, reliable channel state and
//! idle timeouts.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Turns one decoded packet into the replies to send. Pure protocol logic
//! with no socket access.
//!
//! ### World Module (`world`)
//! Loads, bounds-checks and frames the world blob.
//!
//! ### Network Module (`network`)
//! Owns the socket and runs the receive and maintenance loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::world::World;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = World::load("maps/arena.world")?;
//!     let mut server = Server::new("0.0.0.0:5150", world, 32).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod dispatcher;
pub mod gateway;
pub mod network;
pub mod pool;
pub mod world;
