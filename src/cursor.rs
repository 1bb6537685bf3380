//! A bounds-checked byte buffer used by every codec in the crate.
//!
//! Writes append to the end of the buffer and reads consume from the front, so
//! the same type is used to build outgoing packets and to pick apart replies.
//! Every read checks the remaining length first: a short buffer is an
//! [`ProtocolError::UnexpectedEof`], never a partial value.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::ProtocolError;

/// The largest frame the modern protocol can describe (a 3-byte VarInt).
pub const MAX_PACKET_LENGTH: usize = 2_097_151;

/// Largest VarInt-prefixed string the protocol allows, in bytes.
pub const MAX_STRING_LENGTH: usize = 32767 * 3;

/// See [VarInt and VarLong](https://wiki.vg/Protocol#VarInt_and_VarLong).
pub const MAX_VARINT_LENGTH: usize = 5;

#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ByteCursor {
    buf: Vec<u8>,
    pos: usize,
}

impl ByteCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Number of bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread part of the buffer.
    #[must_use]
    pub fn remaining_slice(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// The whole buffer, including bytes that were already read.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    fn take(&mut self, n: usize) -> Result<&[u8], ProtocolError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ProtocolError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    fn put<const N: usize>(&mut self, write: impl FnOnce(&mut [u8])) {
        let mut bytes = [0; N];
        write(&mut bytes);
        self.buf.extend_from_slice(&bytes);
    }

    /// Skips `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.take(2).map(BigEndian::read_u16)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ProtocolError> {
        self.take(2).map(LittleEndian::read_u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.take(4).map(BigEndian::read_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.take(4).map(BigEndian::read_i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.take(8).map(BigEndian::read_u64)
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.take(8).map(BigEndian::read_i64)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ProtocolError> {
        self.take(n).map(<[u8]>::to_vec)
    }

    /// Reads a VarInt of at most [`MAX_VARINT_LENGTH`] bytes.
    pub fn read_varint(&mut self) -> Result<i32, ProtocolError> {
        let mut value = 0u32;
        for i in 0..MAX_VARINT_LENGTH {
            let part = self.read_u8()?;
            value |= u32::from(part & 0x7F) << (7 * i);
            if part & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(ProtocolError::VarIntTooLong)
    }

    /// Reads a VarInt used as a length, rejecting negative values and values
    /// above `limit`.
    pub fn read_length(&mut self, limit: usize) -> Result<usize, ProtocolError> {
        let length = self.read_varint()?;
        let length = usize::try_from(length).map_err(|_| ProtocolError::NegativeLength(length))?;
        if length > limit {
            return Err(ProtocolError::LengthTooLarge { length, limit });
        }
        Ok(length)
    }

    /// Reads a VarInt byte-length prefixed UTF-8 string.
    pub fn read_utf8_string(&mut self, max_len: usize) -> Result<String, ProtocolError> {
        let len = self.read_length(max_len)?;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Reads a big-endian `u16` length in code units followed by UTF-16BE data.
    pub fn read_utf16be_string(&mut self, max_units: usize) -> Result<String, ProtocolError> {
        let units = usize::from(self.read_u16()?);
        if units > max_units {
            return Err(ProtocolError::LengthTooLarge {
                length: units,
                limit: max_units,
            });
        }
        let bytes = self.take(units * 2)?;
        let units: Vec<u16> = bytes.chunks_exact(2).map(BigEndian::read_u16).collect();
        String::from_utf16(&units).map_err(|_| ProtocolError::InvalidUtf16)
    }

    /// Reads a big-endian `u16` byte-length prefixed UTF-8 string (RakNet style).
    pub fn read_u16_string(&mut self) -> Result<String, ProtocolError> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Reads bytes up to and excluding the next NUL, consuming the NUL.
    pub fn read_cstring_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let rest = self.remaining_slice();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnexpectedEof {
                needed: rest.len() + 1,
                remaining: rest.len(),
            })?;
        let bytes = self.read_bytes(end)?;
        self.skip(1)?;
        Ok(bytes)
    }

    /// Reads a NUL-terminated ISO-8859-1 string.
    pub fn read_cstring(&mut self) -> Result<String, ProtocolError> {
        self.read_cstring_bytes().map(|bytes| latin1(&bytes))
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.put::<2>(|b| BigEndian::write_u16(b, value));
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.put::<2>(|b| LittleEndian::write_u16(b, value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.put::<4>(|b| BigEndian::write_u32(b, value));
    }

    pub fn write_i32(&mut self, value: i32) {
        self.put::<4>(|b| BigEndian::write_i32(b, value));
    }

    pub fn write_u64(&mut self, value: u64) {
        self.put::<8>(|b| BigEndian::write_u64(b, value));
    }

    pub fn write_i64(&mut self, value: i64) {
        self.put::<8>(|b| BigEndian::write_i64(b, value));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a VarInt; negative values always take five bytes.
    pub fn write_varint(&mut self, value: i32) {
        let mut value = value as u32;
        loop {
            if value & !0x7F == 0 {
                self.write_u8(value as u8);
                return;
            }
            self.write_u8((value & 0x7F | 0x80) as u8);
            value >>= 7;
        }
    }

    pub fn write_utf8_string(&mut self, s: &str) {
        self.write_varint(s.len() as i32);
        self.write_bytes(s.as_bytes());
    }

    /// Writes a `u16` code unit count followed by the UTF-16BE encoding.
    pub fn write_utf16be_string(&mut self, s: &str) -> Result<(), ProtocolError> {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.write_u16(u16_length(units.len())?);
        for unit in units {
            self.write_u16(unit);
        }
        Ok(())
    }

    pub fn write_u16_string(&mut self, s: &str) -> Result<(), ProtocolError> {
        self.write_u16(u16_length(s.len())?);
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    pub fn write_cstring(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
        self.write_u8(0);
    }
}

fn u16_length(length: usize) -> Result<u16, ProtocolError> {
    u16::try_from(length).map_err(|_| ProtocolError::LengthTooLarge {
        length,
        limit: usize::from(u16::MAX),
    })
}

impl From<Vec<u8>> for ByteCursor {
    fn from(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }
}

impl From<&[u8]> for ByteCursor {
    fn from(buf: &[u8]) -> Self {
        Self::from(buf.to_vec())
    }
}

/// Decodes ISO-8859-1, where every byte is the code point of the same value.
pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
