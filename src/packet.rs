//! Length-prefixed framing used by the modern Java protocol.
//! [Packet format](https://wiki.vg/Protocol#Packet_format)

use crate::{cursor::ByteCursor, error::ProtocolError};

/// A single frame: a VarInt id followed by its payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub id: i32,
    pub payload: ByteCursor,
}

impl Packet {
    #[must_use]
    pub fn new(id: i32, payload: ByteCursor) -> Self {
        Self { id, payload }
    }

    /// Frames the packet as `VarInt(length) ++ VarInt(id) ++ payload`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = ByteCursor::new();
        body.write_varint(self.id);
        body.write_bytes(self.payload.remaining_slice());

        let mut frame = ByteCursor::new();
        frame.write_varint(body.remaining() as i32);
        frame.write_bytes(body.as_bytes());
        frame.into_inner()
    }

    /// Splits a frame body (the bytes after the length prefix) into id and payload.
    pub fn decode(body: Vec<u8>) -> Result<Self, ProtocolError> {
        let mut payload = ByteCursor::from(body);
        let id = payload.read_varint()?;
        Ok(Self { id, payload })
    }

    /// Fails unless the packet carries the `expected` id.
    pub fn expect_id(&self, expected: i32) -> Result<(), ProtocolError> {
        if self.id == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedPacket {
                expected,
                actual: self.id,
            })
        }
    }
}
