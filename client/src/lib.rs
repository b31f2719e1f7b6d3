//! # Angry Tanks Client Library
//!
//! A headless client for the Angry Tanks server. It joins with a handshake,
//! downloads the world, and runs the local shot simulation for its own tank.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - Handshake with retries and a readable error on denial
//! - Reliable world download: acknowledges fragments, resends its own request,
//!   and reassembles the framed world
//! - Heartbeats, debug messages and a clean disconnect
//!
//! ### Game Module (`game`)
//! - The player's tank and its fixed table of shots
//! - Firing through the slot allocator; a full table denies the shot
//! - One update per tick over every shot, then reclamation of finished slots
//! - Per-frame draw data for walls, the tank and its visible shots
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::protocol::{EnterRequest, Team};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:5150").await?;
//!     client.connect(&EnterRequest::new(Team::Red, "gunner", "")).await?;
//!     let world = client.fetch_world().await?;
//!     println!("world is {} bytes", world.len());
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
