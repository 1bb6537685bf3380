//! Implementation of the RakNet ping/pong protocol.
//! [Unconnected Ping](https://wiki.vg/Raknet_Protocol#Unconnected_Ping)

use std::{
    fmt,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::{
    cursor::ByteCursor,
    error::{ProtocolError, ResultExt, Stage},
    motd::Motd,
    transport::{deadline_after, DatagramTransport, UdpTransport, MAX_DATAGRAM_SIZE},
    Address, Error, Pingable,
};

/// Raknets default OFFLINE_MESSAGE_DATA_ID.
///
/// See more: <https://wiki.vg/Raknet_Protocol#Data_types>
pub(crate) const OFFLINE_MESSAGE_DATA_ID: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

/// The default port of a Raknet Bedrock Server.
pub const DEFAULT_PORT: u16 = 19132;

const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1C;
/// Edition, MOTD, protocol, version name, players online and max.
const REQUIRED_FIELDS: usize = 6;

/// Configuration for pinging a Bedrock server.
///
/// # Examples
///
/// ```
/// use mcstat::{bedrock, Address, Bedrock};
/// use std::time::Duration;
///
/// let bedrock_config = Bedrock::new(
///     Address::new("play.nethergames.org", bedrock::DEFAULT_PORT),
///     Duration::from_secs(10),
/// );
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Bedrock {
    pub address: Address,
    /// Deadline for the whole exchange.
    pub timeout: Duration,
}

impl Bedrock {
    #[must_use]
    pub const fn new(address: Address, timeout: Duration) -> Self {
        Self { address, timeout }
    }

    /// A fresh session stamped with the current time and a random GUID.
    #[must_use]
    pub fn session(&self) -> BedrockSession {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_millis() as i64);
        BedrockSession::new(time, rand::random())
    }
}

impl Pingable for Bedrock {
    type Response = BedrockStatusResponse;

    fn ping(self) -> Result<Self::Response, Error> {
        let deadline = deadline_after(self.timeout);
        let mut transport = UdpTransport::connect(&self.address)?;
        let mut session = self.session();
        exchange(&mut transport, &mut session, deadline)
    }
}

/// The first payload field: which flavour of Bedrock the server runs.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum BedrockEdition {
    /// `MCPE`, every ordinary Bedrock server.
    PocketEdition,
    /// `MCEE`, Education Edition.
    EducationEdition,
    Other(String),
}

impl BedrockEdition {
    /// Classifies the tag case-insensitively.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("MCPE") {
            Self::PocketEdition
        } else if tag.eq_ignore_ascii_case("MCEE") {
            Self::EducationEdition
        } else {
            Self::Other(tag.to_string())
        }
    }

    /// The tag as the server would send it.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::PocketEdition => "MCPE",
            Self::EducationEdition => "MCEE",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for BedrockEdition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Bedrock Server Payload Response
///
/// See More: <https://wiki.vg/Raknet_Protocol#Unconnected_Pong>
#[derive(Clone, Debug, PartialEq)]
pub struct BedrockStatusResponse {
    /// The server's edition.
    pub edition: BedrockEdition,
    /// The MOTD line shown in the client's server list.
    pub motd: Motd,
    /// The second line of the server's MOTD.
    ///
    /// Vanilla servers send the level name here. Others use it to advertise
    /// the server software (e.g. PocketMine-MP).
    pub motd_2: Option<String>,
    /// The server's protocol version (ex: 390).
    pub protocol_version: i64,
    /// The name of the servers version (ex: 1.16.200).
    pub version_name: String,
    /// The numbers of players online.
    pub players_online: i64,
    /// The maximum number of players that could be online at once.
    pub players_max: i64,
    /// The GUID from the pong header.
    pub server_guid: u64,
    /// The server unique id from the payload, usually the same GUID in decimal.
    pub server_id: Option<String>,
    /// The game mode the server defaults new users to (e.g. "Survival").
    pub game_mode: Option<String>,
    /// The numerical representation of `game_mode` (e.g. "1").
    pub game_mode_id: Option<i64>,
    /// The port to connect to the server on with an IPv4 address.
    pub port_v4: Option<u16>,
    /// The port to connect to the server on with an IPv6 address.
    pub port_v6: Option<u16>,
    /// Time from sending the ping to receiving the pong.
    pub latency: Duration,
}

fn required(field: &'static str, value: &str) -> Result<i64, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidField {
        field,
        value: value.to_string(),
    })
}

impl BedrockStatusResponse {
    /// Extracts information from the semicolon-separated payload.
    ///
    /// Edition (MCPE or MCEE for Education Edition)
    /// MOTD line 1
    /// Protocol Version
    /// Version Name
    /// Player Count
    /// Max Player Count
    /// Server Unique ID
    /// MOTD line 2
    /// Game mode
    /// Game mode (numeric)
    /// Port (IPv4)
    /// Port (IPv6)
    ///
    /// Fields past these are ignored.
    pub fn from_payload(payload: &str, server_guid: u64, latency: Duration) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = payload.split(';').collect();
        if parts.len() < REQUIRED_FIELDS {
            return Err(ProtocolError::FieldCount {
                expected: "at least 6",
                actual: parts.len(),
            });
        }
        let text = |i: usize| parts.get(i).map(|s| s.to_string());
        let number = |i: usize| parts.get(i).and_then(|s| s.parse().ok());

        Ok(Self {
            edition: BedrockEdition::from_tag(parts[0]),
            motd: Motd::parse(parts[1], true),
            protocol_version: required("protocol", parts[2])?,
            version_name: parts[3].to_string(),
            players_online: required("players_online", parts[4])?,
            players_max: required("players_max", parts[5])?,
            server_guid,
            server_id: text(6),
            motd_2: text(7),
            game_mode: text(8),
            game_mode_id: number(9),
            port_v4: parts.get(10).and_then(|s| s.parse().ok()),
            port_v6: parts.get(11).and_then(|s| s.parse().ok()),
            latency,
        })
    }
}

#[derive(Debug)]
enum BedrockState {
    New,
    AwaitingPong { sent_at: Instant },
    Closed(Option<Box<BedrockStatusResponse>>),
}

/// The unconnected ping exchange, independent of any socket.
#[derive(Debug)]
pub struct BedrockSession {
    time: i64,
    client_guid: u64,
    state: BedrockState,
}

impl BedrockSession {
    /// `time` is echoed by the server; `client_guid` identifies this client.
    #[must_use]
    pub const fn new(time: i64, client_guid: u64) -> Self {
        Self {
            time,
            client_guid,
            state: BedrockState::New,
        }
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self.state {
            BedrockState::New => Stage::BedrockPing,
            _ => Stage::BedrockPong,
        }
    }

    pub fn poll_transmit(&mut self, now: Instant) -> Option<(Stage, Vec<u8>)> {
        if !matches!(self.state, BedrockState::New) {
            return None;
        }
        let mut buf = ByteCursor::new();
        buf.write_u8(UNCONNECTED_PING);
        buf.write_i64(self.time);
        buf.write_bytes(&OFFLINE_MESSAGE_DATA_ID);
        buf.write_u64(self.client_guid);
        self.state = BedrockState::AwaitingPong { sent_at: now };
        debug!(time = self.time, "sending unconnected ping");
        Some((Stage::BedrockPing, buf.into_inner()))
    }

    pub fn handle(&mut self, datagram: &[u8], now: Instant) -> Result<(), Error> {
        let sent_at = match std::mem::replace(&mut self.state, BedrockState::Closed(None)) {
            BedrockState::AwaitingPong { sent_at } => sent_at,
            other => {
                debug!(len = datagram.len(), "dropping datagram outside of a read");
                self.state = other;
                return Ok(());
            }
        };
        let stage = Stage::BedrockPong;
        let mut buf = ByteCursor::from(datagram);

        // time, server guid, MAGIC, payload
        let id = buf.read_u8().at(stage)?;
        if id != UNCONNECTED_PONG {
            return Err(Error::protocol(
                stage,
                ProtocolError::UnexpectedPacket {
                    expected: i32::from(UNCONNECTED_PONG),
                    actual: i32::from(id),
                },
            ));
        }
        let time = buf.read_u64().at(stage)?;
        let server_guid = buf.read_u64().at(stage)?;
        if buf.read_bytes(OFFLINE_MESSAGE_DATA_ID.len()).at(stage)? != OFFLINE_MESSAGE_DATA_ID {
            return Err(Error::protocol(stage, ProtocolError::BadMagic));
        }
        let payload = buf.read_u16_string().at(stage)?;
        debug!(time, server_guid, %payload, "unconnected pong received");

        let response =
            BedrockStatusResponse::from_payload(&payload, server_guid, now - sent_at).at(stage)?;
        self.state = BedrockState::Closed(Some(Box::new(response)));
        Ok(())
    }

    pub fn take_response(&mut self) -> Option<BedrockStatusResponse> {
        match &mut self.state {
            BedrockState::Closed(response) => response.take().map(|response| *response),
            _ => None,
        }
    }
}

/// Runs a session to completion over a blocking datagram socket.
pub fn exchange<T>(
    transport: &mut T,
    session: &mut BedrockSession,
    deadline: Instant,
) -> Result<BedrockStatusResponse, Error>
where
    T: DatagramTransport + ?Sized,
{
    loop {
        while let Some((stage, datagram)) = session.poll_transmit(Instant::now()) {
            transport.send(&datagram, deadline, stage)?;
        }
        if let Some(response) = session.take_response() {
            return Ok(response);
        }
        let datagram = transport.receive(MAX_DATAGRAM_SIZE, deadline, session.stage())?;
        session.handle(&datagram, Instant::now())?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_util::unhex, transport::mock::MockDatagrams};

    const PAYLOAD: &str = "MCPE;Hi;475;1.19.60;1;20;12345;Bedrock;Survival;1;19132;19133";

    fn pong(payload: &str) -> Vec<u8> {
        let mut buf = ByteCursor::new();
        buf.write_u8(UNCONNECTED_PONG);
        buf.write_u64(42);
        buf.write_u64(0xDEAD_BEEF);
        buf.write_bytes(&OFFLINE_MESSAGE_DATA_ID);
        buf.write_u16_string(payload).unwrap();
        buf.into_inner()
    }

    fn run(datagram: Vec<u8>) -> (Result<BedrockStatusResponse, Error>, MockDatagrams) {
        let mut socket = MockDatagrams::new([datagram]);
        let mut session = BedrockSession::new(42, 7);
        let result = exchange(&mut socket, &mut session, deadline_after(Duration::from_secs(5)));
        (result, socket)
    }

    #[test]
    fn ping_bytes() {
        let (_, socket) = run(pong(PAYLOAD));
        assert_eq!(
            socket.sent,
            [unhex("01000000000000002A00FFFF00FEFEFEFEFDFDFDFD123456780000000000000007")]
        );
    }

    #[test]
    fn full_payload() {
        let (response, _) = run(pong(PAYLOAD));
        let response = response.unwrap();
        assert_eq!(response.edition, BedrockEdition::PocketEdition);
        assert_eq!(response.motd.to_plain(), "Hi");
        assert!(response.motd.bedrock);
        assert_eq!(response.protocol_version, 475);
        assert_eq!(response.version_name, "1.19.60");
        assert_eq!((response.players_online, response.players_max), (1, 20));
        assert_eq!(response.server_guid, 0xDEAD_BEEF);
        assert_eq!(response.server_id.as_deref(), Some("12345"));
        assert_eq!(response.motd_2.as_deref(), Some("Bedrock"));
        assert_eq!(response.game_mode.as_deref(), Some("Survival"));
        assert_eq!(response.game_mode_id, Some(1));
        assert_eq!(response.port_v4, Some(19132));
        assert_eq!(response.port_v6, Some(19133));
    }

    #[test]
    fn minimal_and_extra_fields() {
        let response = BedrockStatusResponse::from_payload("MCEE;§gcoin;390;1.16.200;0;10", 1, Duration::ZERO).unwrap();
        assert_eq!(response.edition, BedrockEdition::EducationEdition);
        assert_eq!(response.motd.to_plain(), "coin");
        assert_eq!(response.server_id, None);
        assert_eq!(response.port_v6, None);

        let response = BedrockStatusResponse::from_payload(&format!("{PAYLOAD};0;extra;"), 1, Duration::ZERO).unwrap();
        assert_eq!(response.port_v6, Some(19133));
    }

    #[test]
    fn malformed_optional_fields_are_absent() {
        let response =
            BedrockStatusResponse::from_payload("Other;m;1;v;0;10;id;;;x;port;", 1, Duration::ZERO).unwrap();
        assert_eq!(response.edition, BedrockEdition::Other("Other".into()));
        assert_eq!(response.game_mode_id, None);
        assert_eq!(response.port_v4, None);
        assert_eq!(response.port_v6, None);
    }

    #[test]
    fn too_few_fields() {
        let (response, _) = run(pong("MCPE;Hi;475;1.19.60;1"));
        assert!(matches!(
            response,
            Err(Error::Protocol {
                stage: Stage::BedrockPong,
                source: ProtocolError::FieldCount { actual: 5, .. }
            })
        ));
    }

    #[test]
    fn non_numeric_required_field() {
        let err = BedrockStatusResponse::from_payload("MCPE;Hi;new;1.19.60;1;20", 1, Duration::ZERO).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "protocol", .. }));
    }

    #[test]
    fn bad_magic() {
        let mut datagram = pong(PAYLOAD);
        datagram[17] ^= 0xFF;
        let (response, _) = run(datagram);
        assert!(matches!(
            response,
            Err(Error::Protocol {
                source: ProtocolError::BadMagic,
                ..
            })
        ));
    }

    #[test]
    fn wrong_packet() {
        let mut datagram = pong(PAYLOAD);
        datagram[0] = 0x01;
        let (response, _) = run(datagram);
        assert!(matches!(
            response,
            Err(Error::Protocol {
                source: ProtocolError::UnexpectedPacket { expected: 0x1C, actual: 1 },
                ..
            })
        ));
    }

    #[test]
    fn no_pong_times_out() {
        let mut socket = MockDatagrams::new(Vec::<Vec<u8>>::new());
        let result = exchange(&mut socket, &mut BedrockSession::new(0, 0), deadline_after(Duration::from_secs(1)));
        assert!(matches!(
            result,
            Err(Error::Timeout {
                stage: Stage::BedrockPong
            })
        ));
    }

    #[test]
    fn edition_tags() {
        assert_eq!(BedrockEdition::from_tag("mcee"), BedrockEdition::EducationEdition);
        assert_eq!(BedrockEdition::from_tag("MCPE"), BedrockEdition::PocketEdition);
        let other = BedrockEdition::from_tag("Geyser");
        assert_eq!(other, BedrockEdition::Other("Geyser".into()));
        assert_eq!(other.to_string(), "Geyser");
        assert_eq!(BedrockEdition::EducationEdition.to_string(), "MCEE");
    }
}
