//! The world blob served to every client.
//!
//! The world is loaded once at startup and never changes afterwards.

use log::info;
use shared::protocol::{encode_world_response, MAX_WORLD_SIZE};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("a world file does not exist at '{}'", .0.display())]
    Missing(PathBuf),

    #[error("failed to read world file '{}': {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("world is {size} bytes, the limit is {} bytes", MAX_WORLD_SIZE)]
    TooLarge { size: usize },
}

#[derive(Debug, Clone)]
pub struct World {
    raw: Box<[u8]>,
}

impl World {
    /// Reads the world file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorldError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(WorldError::Missing(path.to_path_buf()));
        }

        let raw = std::fs::read(path).map_err(|source| WorldError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let world = Self::from_bytes(raw)?;
        info!("Loaded world '{}' ({} bytes)", path.display(), world.len());
        Ok(world)
    }

    /// Wraps an in-memory blob. Worlds larger than the 16-bit length field are rejected, never truncated.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, WorldError> {
        if raw.len() > MAX_WORLD_SIZE {
            return Err(WorldError::TooLarge { size: raw.len() });
        }
        Ok(Self { raw: raw.into() })
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The `[MsgWorld][length][blob]` reply to a world request.
    pub fn frame(&self) -> Vec<u8> {
        // from_bytes bounds the length, so framing cannot fail
        encode_world_response(&self.raw).unwrap_or_default()
    }
}
