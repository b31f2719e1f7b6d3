//! # Shared game core
//!
//! Types and simulation code used by both the server and the client.
//!
//! - [`protocol`]: message tags, constants and the byte layout of application payloads
//! - [`transport`]: datagram envelope and reliable ordered delivery
//! - [`math`]: 2D vectors and bounding boxes
//! - [`collision`]: broad-phase grid and narrow-phase shot collision
//! - [`shot`]: slot allocation and the shot state machine
//! - [`entity`]: tanks and per-frame draw data

pub mod collision;
pub mod entity;
pub mod math;
pub mod protocol;
pub mod shot;
pub mod transport;

pub use collision::{find_nearest_collision, Collision, Obb, Obstacle, ObstacleGrid};
pub use entity::{EntityKind, EntityRef, Sprite, Tank};
pub use math::{Aabb, Vector2};
pub use protocol::{
    EnterRequest, MessageType, ProtocolError, Team, DUMMY_SHOT, MAX_SHOTS, MAX_WORLD_SIZE,
    PROTOCOL_VERSION,
};
pub use shot::{
    allocate_slot, GameTime, GameVars, PlayerId, Shot, ShotError, ShotSlot, ShotState, ShotTable,
};
pub use transport::{ChannelError, Packet, ReliableChannel, Sequenced};
