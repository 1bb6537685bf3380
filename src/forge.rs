//! Decoder for the Forge mod loader data some Java servers add to their
//! status response.
//!
//! Three shapes exist in the wild:
//!
//! - FML1 (`modinfo`): a `modList` of `{modid, version}`.
//! - FML2 (`forgeData`): `channels` of `{res, version, required}` and `mods`
//!   of `{modId, modmarker}`.
//! - FML3 (`forgeData` since 1.18.1): the same information packed into the
//!   `d` string, where every UTF-16 code unit carries 15 bits of a binary
//!   buffer. See Forge's `ServerStatusPing` for the encoder.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    cursor::{ByteCursor, MAX_PACKET_LENGTH, MAX_STRING_LENGTH},
    error::ProtocolError,
};

/// Version reported for mods that the client does not need to have.
pub const SERVER_ONLY: &str = "<not required for client>";

const FLAG_IGNORE_SERVER_ONLY: i32 = 0b1;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ForgeData {
    /// Forge mod loader network version; 1 when the server does not say.
    pub fml_network_version: i64,
    /// Network channels, those of mods first.
    pub channels: Vec<ForgeChannel>,
    pub mods: Vec<ForgeMod>,
    /// Whether the server cut the lists short to fit the status response.
    pub truncated: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ForgeChannel {
    /// Namespaced channel name, e.g. `fml:handshake`.
    pub name: String,
    pub version: String,
    /// Whether a client must have this channel to join.
    pub required: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ForgeMod {
    pub id: String,
    /// The mod version, a marker such as `ANY`, or [`SERVER_ONLY`].
    pub version: String,
}

#[derive(Deserialize)]
struct RawForgeData {
    #[serde(rename = "fmlNetworkVersion")]
    fml_network_version: Option<i64>,
    #[serde(default)]
    channels: Vec<RawChannel>,
    mods: Option<Vec<RawMod>>,
    #[serde(rename = "modList")]
    mod_list: Option<Vec<RawMod>>,
    d: Option<String>,
}

#[derive(Deserialize)]
struct RawChannel {
    res: String,
    version: String,
    required: bool,
}

#[derive(Deserialize)]
struct RawMod {
    modid: Option<String>,
    #[serde(rename = "modId")]
    mod_id: Option<String>,
    modmarker: Option<String>,
    version: Option<String>,
}

impl TryFrom<RawMod> for ForgeMod {
    type Error = ProtocolError;

    fn try_from(raw: RawMod) -> Result<Self, Self::Error> {
        Ok(Self {
            id: raw
                .modid
                .or(raw.mod_id)
                .ok_or(ProtocolError::MissingField("modid"))?,
            version: raw
                .modmarker
                .or(raw.version)
                .ok_or(ProtocolError::MissingField("modmarker"))?,
        })
    }
}

impl ForgeData {
    /// Builds the data from a `forgeData` or `modinfo` JSON object.
    pub fn from_json(value: &Value) -> Result<Self, ProtocolError> {
        let raw = RawForgeData::deserialize(value)?;
        let fml_network_version = raw.fml_network_version.unwrap_or(1);

        if let Some(d) = raw.d {
            let mut buffer = decode_optimized(&d)?;
            return Self::decode(&mut buffer, fml_network_version);
        }

        let mods = raw
            .mods
            .or(raw.mod_list)
            .ok_or(ProtocolError::MissingField("mods"))?;
        Ok(Self {
            fml_network_version,
            channels: raw
                .channels
                .into_iter()
                .map(|c| ForgeChannel {
                    name: c.res,
                    version: c.version,
                    required: c.required,
                })
                .collect(),
            mods: mods
                .into_iter()
                .map(ForgeMod::try_from)
                .collect::<Result<_, _>>()?,
            truncated: false,
        })
    }

    /// Decodes the binary mod and channel lists of FML3.
    ///
    /// If the server marked the data as truncated, running out of bytes keeps
    /// what was read so far. Otherwise it is an error.
    pub fn decode(buffer: &mut ByteCursor, fml_network_version: i64) -> Result<Self, ProtocolError> {
        let truncated = buffer.read_bool()?;
        let mod_count = buffer.read_u16()?;

        let mut data = Self {
            fml_network_version,
            channels: Vec::new(),
            mods: Vec::new(),
            truncated,
        };
        match data.read_entries(buffer, mod_count) {
            Ok(()) => Ok(data),
            Err(e) if truncated => {
                debug!(error = %e, mods = data.mods.len(), "forge data ends early");
                Ok(data)
            }
            Err(e) => Err(e),
        }
    }

    fn read_entries(&mut self, buffer: &mut ByteCursor, mod_count: u16) -> Result<(), ProtocolError> {
        for _ in 0..mod_count {
            let flags = buffer.read_varint()?;
            let channel_count = flags >> 1;
            let id = buffer.read_utf8_string(MAX_STRING_LENGTH)?;
            let version = if flags & FLAG_IGNORE_SERVER_ONLY == 0 {
                buffer.read_utf8_string(MAX_STRING_LENGTH)?
            } else {
                SERVER_ONLY.to_string()
            };

            for _ in 0..channel_count {
                let channel = read_channel(buffer, Some(&id))?;
                self.channels.push(channel);
            }
            self.mods.push(ForgeMod { id, version });
        }

        let non_mod_channels = buffer.read_varint()?;
        for _ in 0..non_mod_channels {
            let channel = read_channel(buffer, None)?;
            self.channels.push(channel);
        }
        Ok(())
    }
}

fn read_channel(buffer: &mut ByteCursor, mod_id: Option<&str>) -> Result<ForgeChannel, ProtocolError> {
    let name = buffer.read_utf8_string(MAX_STRING_LENGTH)?;
    let version = buffer.read_utf8_string(MAX_STRING_LENGTH)?;
    let required = buffer.read_bool()?;
    Ok(ForgeChannel {
        name: match mod_id {
            Some(mod_id) => format!("{mod_id}:{name}"),
            None => name,
        },
        version,
        required,
    })
}

/// Unpacks the `d` string: two code units of size, then 15 bits per unit.
pub fn decode_optimized(d: &str) -> Result<ByteCursor, ProtocolError> {
    let mut units = d.encode_utf16();
    let mut size_unit = || {
        units
            .next()
            .map(|u| usize::from(u & 0x7FFF))
            .ok_or(ProtocolError::UnexpectedEof {
                needed: 1,
                remaining: 0,
            })
    };
    let size = size_unit()? | (size_unit()? << 15);

    let mut out = Vec::with_capacity(size.min(MAX_PACKET_LENGTH));
    let mut value = 0u32;
    // may go negative: the last unit can carry fewer than 8 useful bits
    let mut bits = 0i32;
    while out.len() < size {
        if bits < 8 {
            match units.next() {
                Some(unit) => {
                    value |= u32::from(unit & 0x7FFF) << bits.max(0);
                    bits += 15;
                }
                None if bits <= 0 => {
                    return Err(ProtocolError::UnexpectedEof {
                        needed: size - out.len(),
                        remaining: 0,
                    })
                }
                None => {}
            }
        }
        out.push((value & 0xFF) as u8);
        value >>= 8;
        bits -= 8;
    }
    Ok(ByteCursor::from(out))
}
