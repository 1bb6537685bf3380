//! Implementation of the pre-1.7 server list ping.
//! [Server List Ping](https://wiki.vg/Server_List_Ping#1.6)
//!
//! The reply to every variant is a kick packet: `0xFF`, a `u16` length in
//! UTF-16 code units, then the UTF-16BE text. Servers since 1.4 answer with
//! `§1\0protocol\0version\0motd\0online\0max`; older ones with
//! `motd§online§max`.

use std::{
    fmt,
    time::{Duration, Instant},
};

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;

use crate::{
    cursor::ByteCursor,
    error::{ProtocolError, ResultExt, Stage},
    motd::Motd,
    transport::{deadline_after, StreamTransport, TcpTransport},
    Address, Error, Pingable,
};

const KICK_PACKET_ID: u8 = 0xFF;
const PING_HOST_CHANNEL: &str = "MC|PingHost";
/// Protocol version announced in the 1.6 `MC|PingHost` message.
const PING_HOST_PROTOCOL: u8 = 74;
const MODERN_PREFIX: &str = "§1\0";

/// Which historical request to send.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LegacyVariant {
    /// Beta 1.8 to 1.3: a lone `0xFE`.
    Beta,
    /// 1.4 and 1.5: `0xFE 0x01`.
    V1_4,
    /// 1.6: `0xFE 0x01 0xFA` followed by an `MC|PingHost` plugin message.
    V1_6,
}

impl fmt::Display for LegacyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Beta => "beta",
            Self::V1_4 => "1.4",
            Self::V1_6 => "1.6",
        })
    }
}

impl LegacyVariant {
    /// The request bytes for this variant.
    ///
    /// The 1.6 request carries the host with a `u16` length, so a host that
    /// does not fit is an [`Error::InvalidAddress`].
    pub fn request(self, address: &Address) -> Result<Vec<u8>, Error> {
        let mut buf = ByteCursor::new();
        buf.write_u8(0xFE);
        if self == Self::Beta {
            return Ok(buf.into_inner());
        }
        buf.write_u8(0x01);
        if self == Self::V1_4 {
            return Ok(buf.into_inner());
        }

        // protocol byte, host length and string, port
        let message_len = u16::try_from(address.host.encode_utf16().count())
            .ok()
            .and_then(|units| units.checked_mul(2))
            .and_then(|host_len| host_len.checked_add(7))
            .ok_or_else(|| Error::InvalidAddress(address.to_string()))?;

        let invalid = |_| Error::InvalidAddress(address.to_string());
        buf.write_u8(0xFA);
        buf.write_utf16be_string(PING_HOST_CHANNEL).map_err(invalid)?;
        buf.write_u16(message_len);
        buf.write_u8(PING_HOST_PROTOCOL);
        buf.write_utf16be_string(&address.host).map_err(invalid)?;
        buf.write_i32(i32::from(address.port));
        Ok(buf.into_inner())
    }
}

/// Configuration for pinging a pre-1.7 server.
///
/// # Examples
///
/// ```
/// use mcstat::{legacy::LegacyVariant, Address, Legacy};
/// use std::time::Duration;
///
/// let legacy_config = Legacy {
///     variant: LegacyVariant::Beta,
///     ..Legacy::new(Address::new("localhost", 25565), Duration::from_secs(5))
/// };
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Legacy {
    pub address: Address,
    pub timeout: Duration,
    /// The request format to send. Defaults to [`LegacyVariant::V1_6`].
    pub variant: LegacyVariant,
}

impl Legacy {
    #[must_use]
    pub const fn new(address: Address, timeout: Duration) -> Self {
        Self {
            address,
            timeout,
            variant: LegacyVariant::V1_6,
        }
    }

    pub fn session(&self) -> Result<LegacySession, Error> {
        LegacySession::new(&self.address, self.variant)
    }
}

impl Pingable for Legacy {
    type Response = LegacyStatusResponse;

    fn ping(self) -> Result<Self::Response, Error> {
        let mut session = self.session()?;
        let deadline = deadline_after(self.timeout);
        let mut transport = TcpTransport::connect(&self.address, deadline)?;
        let result = exchange(&mut transport, &mut session, deadline);
        transport.close();
        result
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LegacyPlayers {
    pub online: i64,
    pub max: i64,
}

/// Reported by servers since 1.4 only.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LegacyVersion {
    pub protocol: i64,
    /// The game version, e.g. `1.6.4`.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyStatusResponse {
    pub motd: Motd,
    pub players: LegacyPlayers,
    pub version: Option<LegacyVersion>,
    /// Time from sending the request to reading the whole reply.
    pub latency: Duration,
}

fn number(field: &'static str, value: &str) -> Result<i64, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidField {
        field,
        value: value.to_string(),
    })
}

impl LegacyStatusResponse {
    /// Decodes the text of a kick packet.
    ///
    /// A reply that is neither shape is the server refusing the request,
    /// usually with an "outdated client" message, and is reported as
    /// [`Error::UnsupportedVariant`].
    pub fn parse(reply: &str, variant: LegacyVariant, latency: Duration) -> Result<Self, Error> {
        let stage = Stage::LegacyResponse;
        if let Some(fields) = reply.strip_prefix(MODERN_PREFIX) {
            let fields: Vec<&str> = fields.split('\0').collect();
            let [protocol, name, motd, online, max] = fields[..] else {
                return Err(Error::protocol(
                    stage,
                    ProtocolError::FieldCount {
                        expected: "6",
                        actual: fields.len() + 1,
                    },
                ));
            };
            return Ok(Self {
                motd: Motd::parse(motd, false),
                players: LegacyPlayers {
                    online: number("online", online).at(stage)?,
                    max: number("max", max).at(stage)?,
                },
                version: Some(LegacyVersion {
                    protocol: number("protocol", protocol).at(stage)?,
                    name: name.to_string(),
                }),
                latency,
            });
        }

        if !reply.contains('§') {
            return Err(Error::UnsupportedVariant {
                variant,
                message: reply.to_string(),
            });
        }
        // the MOTD itself may contain section signs
        let fields: Vec<&str> = reply.rsplitn(3, '§').collect();
        let [max, online, motd] = fields[..] else {
            return Err(Error::protocol(
                stage,
                ProtocolError::FieldCount {
                    expected: "3",
                    actual: fields.len(),
                },
            ));
        };
        Ok(Self {
            motd: Motd::parse(motd, false),
            players: LegacyPlayers {
                online: number("online", online).at(stage)?,
                max: number("max", max).at(stage)?,
            },
            version: None,
            latency,
        })
    }
}

#[derive(Debug)]
enum LegacyState {
    New,
    AwaitingHeader { sent_at: Instant },
    AwaitingBody { sent_at: Instant, units: usize },
    Closed(Option<Box<LegacyStatusResponse>>),
}

/// The legacy exchange, independent of any socket.
///
/// The reply is not length-framed, so the session reports how many bytes it
/// needs next through [`bytes_wanted`](Self::bytes_wanted).
#[derive(Debug)]
pub struct LegacySession {
    request: Vec<u8>,
    variant: LegacyVariant,
    state: LegacyState,
}

impl LegacySession {
    pub fn new(address: &Address, variant: LegacyVariant) -> Result<Self, Error> {
        Ok(Self {
            request: variant.request(address)?,
            variant,
            state: LegacyState::New,
        })
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self.state {
            LegacyState::New => Stage::LegacyRequest,
            _ => Stage::LegacyResponse,
        }
    }

    /// The number of bytes to read before the next call to
    /// [`handle`](Self::handle). Zero once nothing more is expected.
    #[must_use]
    pub const fn bytes_wanted(&self) -> usize {
        match self.state {
            LegacyState::AwaitingHeader { .. } => 3,
            LegacyState::AwaitingBody { units, .. } => units * 2,
            LegacyState::New | LegacyState::Closed(_) => 0,
        }
    }

    pub fn poll_transmit(&mut self, now: Instant) -> Option<(Stage, Vec<u8>)> {
        if !matches!(self.state, LegacyState::New) {
            return None;
        }
        debug!(variant = %self.variant, "sending legacy ping");
        self.state = LegacyState::AwaitingHeader { sent_at: now };
        Some((Stage::LegacyRequest, std::mem::take(&mut self.request)))
    }

    /// Consumes exactly [`bytes_wanted`](Self::bytes_wanted) bytes.
    pub fn handle(&mut self, bytes: &[u8], now: Instant) -> Result<(), Error> {
        let stage = Stage::LegacyResponse;
        match std::mem::replace(&mut self.state, LegacyState::Closed(None)) {
            LegacyState::AwaitingHeader { sent_at } => {
                let mut header = ByteCursor::from(bytes);
                let id = header.read_u8().at(stage)?;
                if id != KICK_PACKET_ID {
                    return Err(Error::protocol(
                        stage,
                        ProtocolError::UnexpectedPacket {
                            expected: i32::from(KICK_PACKET_ID),
                            actual: i32::from(id),
                        },
                    ));
                }
                let units = usize::from(header.read_u16().at(stage)?);
                self.state = if units == 0 {
                    let response = LegacyStatusResponse::parse("", self.variant, now - sent_at)?;
                    LegacyState::Closed(Some(Box::new(response)))
                } else {
                    LegacyState::AwaitingBody { sent_at, units }
                };
                Ok(())
            }
            LegacyState::AwaitingBody { sent_at, units } => {
                if bytes.len() != units * 2 {
                    return Err(Error::protocol(
                        stage,
                        ProtocolError::UnexpectedEof {
                            needed: units * 2,
                            remaining: bytes.len(),
                        },
                    ));
                }
                let units: Vec<u16> = bytes.chunks_exact(2).map(BigEndian::read_u16).collect();
                let reply = String::from_utf16(&units)
                    .map_err(|_| ProtocolError::InvalidUtf16)
                    .at(stage)?;
                let response = LegacyStatusResponse::parse(&reply, self.variant, now - sent_at)?;
                debug!(
                    online = response.players.online,
                    max = response.players.max,
                    "legacy status received"
                );
                self.state = LegacyState::Closed(Some(Box::new(response)));
                Ok(())
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    pub fn take_response(&mut self) -> Option<LegacyStatusResponse> {
        match &mut self.state {
            LegacyState::Closed(response) => response.take().map(|response| *response),
            _ => None,
        }
    }
}

/// Runs a session to completion over a blocking stream.
pub fn exchange<T>(
    transport: &mut T,
    session: &mut LegacySession,
    deadline: Instant,
) -> Result<LegacyStatusResponse, Error>
where
    T: StreamTransport + ?Sized,
{
    loop {
        while let Some((stage, bytes)) = session.poll_transmit(Instant::now()) {
            transport.write_all(&bytes, deadline, stage)?;
        }
        if let Some(response) = session.take_response() {
            return Ok(response);
        }
        let bytes = transport.read_exact(session.bytes_wanted(), deadline, session.stage())?;
        session.handle(&bytes, Instant::now())?;
    }
}
