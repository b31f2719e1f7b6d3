//! Application-level message layout shared by client and server.
//!
//! Payloads carried inside a transport [`Packet`](crate::transport::Packet) start
//! with a one-byte [`MessageType`] tag followed by fixed fields. Multi-byte
//! integers are little-endian. Strings are a 7-bit variable-length byte count
//! followed by UTF-8 bytes.

use std::fmt;
use thiserror::Error;

/// Version both peers must report exactly during the handshake.
pub const PROTOCOL_VERSION: u16 = 1;

/// Maximum concurrent shots a single player may have in flight.
pub const MAX_SHOTS: u8 = 10;

/// Wire value of the "no slot available" sentinel.
pub const DUMMY_SHOT: u8 = u8::MAX;

/// Largest world blob the 16-bit length field can describe.
pub const MAX_WORLD_SIZE: usize = u16::MAX as usize;

/// Longest encoded string length prefix, in bytes.
const MAX_VARINT_BYTES: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message truncated: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("message type not as expected: expected {expected}, got {got}")]
    UnexpectedMessageType { expected: MessageType, got: u8 },

    #[error("protocol versions do not match: server is {server}, you are {client}")]
    VersionMismatch { server: u16, client: u16 },

    #[error("unknown team {0}")]
    UnknownTeam(u8),

    #[error("string field is not valid UTF-8")]
    InvalidString,

    #[error("string length prefix is malformed")]
    InvalidLength,

    #[error("world of {0} bytes does not fit in a 16-bit length field")]
    WorldTooLarge(usize),
}

/// Leading tag of every application payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    MsgEnter = 1,
    MsgWorld = 2,
}

impl MessageType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageType::MsgEnter),
            2 => Some(MessageType::MsgWorld),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::MsgEnter => write!(f, "MsgEnter"),
            MessageType::MsgWorld => write!(f, "MsgWorld"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Team {
    Automatic = 0,
    Rogue = 1,
    Red = 2,
    Green = 3,
    Blue = 4,
    Purple = 5,
    Observer = 6,
}

impl Team {
    /// Values past `Observer` are rejected rather than carried through.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0 => Team::Automatic,
            1 => Team::Rogue,
            2 => Team::Red,
            3 => Team::Green,
            4 => Team::Blue,
            5 => Team::Purple,
            6 => Team::Observer,
            other => return Err(ProtocolError::UnknownTeam(other)),
        })
    }

    /// Display colour as RGBA.
    pub fn color(&self) -> [u8; 4] {
        match self {
            Team::Automatic | Team::Observer => [255, 255, 255, 255],
            Team::Rogue => [255, 255, 0, 255],
            Team::Red => [255, 68, 68, 255],
            Team::Green => [68, 255, 68, 255],
            Team::Blue => [68, 68, 255, 255],
            Team::Purple => [200, 68, 255, 255],
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cursor over a received payload.
#[derive(Debug)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_varint(&mut self) -> Result<u32, ProtocolError> {
        let mut value: u32 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::InvalidLength)
    }

    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_varint()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidString)
    }
}

/// Builder for an outgoing payload.
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_string(&mut self, value: &str) -> &mut Self {
        let mut len = value.len() as u32;
        loop {
            let byte = (len & 0x7f) as u8;
            len >>= 7;
            if len == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
        self.write_bytes(value.as_bytes())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Handshake sent by a client asking to join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterRequest {
    pub protocol_version: u16,
    pub team: Team,
    pub callsign: String,
    pub tag: String,
}

impl EnterRequest {
    pub fn new(team: Team, callsign: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            team,
            callsign: callsign.into(),
            tag: tag.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = MessageWriter::new();
        writer
            .write_u8(MessageType::MsgEnter as u8)
            .write_u16(self.protocol_version)
            .write_u8(self.team as u8)
            .write_string(&self.callsign)
            .write_string(&self.tag);
        writer.into_inner()
    }
}

/// `[MsgWorld]`, the world fetch request.
pub fn encode_world_request() -> Vec<u8> {
    vec![MessageType::MsgWorld as u8]
}

/// Frames a world blob as `[MsgWorld][length:u16][blob]`.
pub fn encode_world_response(world: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(world.len()).map_err(|_| ProtocolError::WorldTooLarge(world.len()))?;

    let mut writer = MessageWriter::with_capacity(1 + 2 + world.len());
    writer
        .write_u8(MessageType::MsgWorld as u8)
        .write_u16(len)
        .write_bytes(world);
    Ok(writer.into_inner())
}

/// Reverses [`encode_world_response`], returning the blob.
pub fn decode_world_response(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut reader = MessageReader::new(payload);
    let tag = reader.read_u8()?;
    if tag != MessageType::MsgWorld as u8 {
        return Err(ProtocolError::UnexpectedMessageType {
            expected: MessageType::MsgWorld,
            got: tag,
        });
    }
    let len = reader.read_u16()? as usize;
    Ok(reader.read_bytes(len)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_response_layout() {
        let world: Vec<u8> = (0u8..10).collect();
        let framed = encode_world_response(&world).unwrap();

        let mut expected = vec![MessageType::MsgWorld as u8, 0x0A, 0x00];
        expected.extend_from_slice(&world);
        assert_eq!(framed, expected);

        assert_eq!(decode_world_response(&framed).unwrap(), world);
    }

    #[test]
    fn test_world_response_empty_and_max() {
        let framed = encode_world_response(&[]).unwrap();
        assert_eq!(framed, vec![MessageType::MsgWorld as u8, 0, 0]);
        assert!(decode_world_response(&framed).unwrap().is_empty());

        let max = vec![7u8; MAX_WORLD_SIZE];
        let framed = encode_world_response(&max).unwrap();
        assert_eq!(&framed[1..3], &[0xFF, 0xFF]);
        assert_eq!(decode_world_response(&framed).unwrap().len(), MAX_WORLD_SIZE);
    }

    #[test]
    fn test_world_response_rejects_oversize() {
        let too_big = vec![0u8; MAX_WORLD_SIZE + 1];
        assert_eq!(
            encode_world_response(&too_big),
            Err(ProtocolError::WorldTooLarge(MAX_WORLD_SIZE + 1))
        );
    }

    #[test]
    fn test_world_response_truncated() {
        let framed = vec![MessageType::MsgWorld as u8, 0x05, 0x00, 1, 2];
        assert_eq!(
            decode_world_response(&framed),
            Err(ProtocolError::Truncated {
                needed: 5,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_enter_request_layout() {
        let request = EnterRequest::new(Team::Red, "ab", "");
        let bytes = request.encode();

        let version = PROTOCOL_VERSION.to_le_bytes();
        assert_eq!(
            bytes,
            vec![
                MessageType::MsgEnter as u8,
                version[0],
                version[1],
                Team::Red as u8,
                2,
                b'a',
                b'b',
                0
            ]
        );
    }

    #[test]
    fn test_long_string_uses_multibyte_length() {
        let long = "x".repeat(300);
        let mut writer = MessageWriter::new();
        writer.write_string(&long);
        let bytes = writer.into_inner();

        // 300 = 0b10_0101100 -> 0xAC 0x02
        assert_eq!(&bytes[..2], &[0xAC, 0x02]);

        let mut reader = MessageReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), long);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_invalid_utf8_string() {
        let bytes = [2u8, 0xff, 0xfe];
        let mut reader = MessageReader::new(&bytes);
        assert_eq!(reader.read_string(), Err(ProtocolError::InvalidString));
    }

    #[test]
    fn test_unterminated_length_prefix() {
        let bytes = [0x80u8; 6];
        let mut reader = MessageReader::new(&bytes);
        assert_eq!(reader.read_string(), Err(ProtocolError::InvalidLength));
    }

    #[test]
    fn test_error_messages() {
        let err = ProtocolError::UnexpectedMessageType {
            expected: MessageType::MsgEnter,
            got: 9,
        };
        assert_eq!(
            err.to_string(),
            "message type not as expected: expected MsgEnter, got 9"
        );

        let err = ProtocolError::VersionMismatch {
            server: 1,
            client: 7,
        };
        assert_eq!(
            err.to_string(),
            "protocol versions do not match: server is 1, you are 7"
        );
    }

    #[test]
    fn test_team_from_u8() {
        assert_eq!(Team::from_u8(4), Ok(Team::Blue));
        assert_eq!(Team::from_u8(42), Err(ProtocolError::UnknownTeam(42)));
    }
}
