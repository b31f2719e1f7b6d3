//! Handshake validation.
//!
//! A joining client sends `[MsgEnter][version:u16][team:u8][callsign][tag]`.
//! The gateway checks the tag first, then the protocol version, and only then
//! extracts the remaining fields. Any failure is a denial with a readable reason.

use log::debug;
use shared::protocol::{EnterRequest, MessageReader, MessageType, ProtocolError, Team};
use shared::PROTOCOL_VERSION;

/// Outcome of a handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    Approve(EnterRequest),
    Deny(String),
}

#[derive(Debug, Clone)]
pub struct ConnectionGateway {
    protocol_version: u16,
}

impl ConnectionGateway {
    pub fn new() -> Self {
        Self::with_version(PROTOCOL_VERSION)
    }

    pub fn with_version(protocol_version: u16) -> Self {
        Self { protocol_version }
    }

    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    /// Approves or denies a raw handshake. Never registers anything itself.
    pub fn handle_approval(&self, message: &[u8]) -> Approval {
        match self.parse(message) {
            Ok(request) => Approval::Approve(request),
            Err(e) => Approval::Deny(e.to_string()),
        }
    }

    fn parse(&self, message: &[u8]) -> Result<EnterRequest, ProtocolError> {
        let mut reader = MessageReader::new(message);

        let tag = reader.read_u8()?;
        if tag != MessageType::MsgEnter as u8 {
            return Err(ProtocolError::UnexpectedMessageType {
                expected: MessageType::MsgEnter,
                got: tag,
            });
        }

        let client_version = reader.read_u16()?;
        if client_version != self.protocol_version {
            return Err(ProtocolError::VersionMismatch {
                server: self.protocol_version,
                client: client_version,
            });
        }

        // Team bytes outside the known range deny the handshake
        let team = Team::from_u8(reader.read_u8()?)?;
        let callsign = reader.read_string()?;
        let tag = reader.read_string()?;

        debug!("Proto version: {}", client_version);
        debug!("Team: {}", team);
        debug!("Callsign: {}", callsign);
        debug!("Tag: {}", tag);

        Ok(EnterRequest {
            protocol_version: client_version,
            team,
            callsign,
            tag,
        })
    }
}

impl Default for ConnectionGateway {
    fn default() -> Self {
        Self::new()
    }
}
