//! Implementation of the Java Minecraft ping protocol.
//! [Server List Ping](https://wiki.vg/Server_List_Ping)

use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    cursor::{ByteCursor, MAX_PACKET_LENGTH},
    error::{ProtocolError, ResultExt, Stage},
    forge::ForgeData,
    motd::Motd,
    packet::Packet,
    transport::{deadline_after, StreamTransport, TcpTransport},
    Address, Error, Pingable,
};

/// The default port of a Java server.
pub const DEFAULT_PORT: u16 = 25565;

/// Protocol version sent in the handshake unless configured otherwise (1.8).
pub const DEFAULT_PROTOCOL_VERSION: i32 = 47;

/// Configuration for pinging a Java server.
///
/// # Examples
///
/// ```
/// use mcstat::{Address, Java};
/// use std::time::Duration;
///
/// let java_config = Java {
///     ping: false,
///     ..Java::new(Address::new("mc.hypixel.net", 25565), Duration::from_secs(10))
/// };
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Java {
    /// The server address. No SRV lookup is performed.
    pub address: Address,
    /// Deadline for the whole exchange, connecting included.
    pub timeout: Duration,
    /// The protocol version announced in the handshake.
    pub protocol_version: i32,
    /// Whether to follow the status request with a ping to measure latency.
    ///
    /// Without it the latency is the time the status request took.
    pub ping: bool,
}

impl Java {
    #[must_use]
    pub const fn new(address: Address, timeout: Duration) -> Self {
        Self {
            address,
            timeout,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            ping: true,
        }
    }

    /// A fresh session for this configuration, with a random ping payload.
    #[must_use]
    pub fn session(&self) -> JavaSession {
        JavaSession::new(
            &self.address,
            self.protocol_version,
            self.ping.then(rand::random),
        )
    }
}

impl Pingable for Java {
    type Response = JavaStatusResponse;

    fn ping(self) -> Result<Self::Response, Error> {
        let deadline = deadline_after(self.timeout);
        let mut transport = TcpTransport::connect(&self.address, deadline)?;
        let mut session = self.session();
        let result = exchange(&mut transport, &mut session, deadline);
        transport.close();
        result
    }
}

/// The server status response.
///
/// More information can be found [here](https://wiki.vg/Server_List_Ping).
#[derive(Debug, Clone, PartialEq)]
pub struct JavaStatusResponse {
    pub version: Version,
    pub players: Players,
    /// The description of the server (MOTD). Empty when the server sent none.
    pub motd: Motd,
    /// The server icon, a `data:image/png;base64,` URI.
    pub favicon: Option<String>,
    /// Mod information from `forgeData` or `modinfo`.
    pub forge_data: Option<ForgeData>,
    /// Does this server enforce chat signing?
    pub enforces_secure_chat: Option<bool>,
    /// Does this server have chat previews?
    pub previews_chat: Option<bool>,
    /// Round trip time of the ping, or of the status request when the ping
    /// was skipped.
    pub latency: Duration,
    /// The JSON document exactly as received.
    pub raw: Value,
}

/// Information about the server's version
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct Version {
    /// The name of the version the server is running
    ///
    /// In practice this comes in a large variety of different formats.
    pub name: String,
    /// See [Protocol Version Numbers](https://wiki.vg/Protocol_version_numbers)
    pub protocol: i64,
}

/// An online player of the server.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct Player {
    /// The name of the player.
    pub name: String,
    /// The player's UUID
    pub id: String,
}

/// The stats for players on the server.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct Players {
    /// The max amount of players.
    pub max: i64,
    /// The amount of players online.
    pub online: i64,
    /// A preview of which players are online
    ///
    /// In practice servers often don't send this or use it for more advertising
    pub sample: Option<Vec<Player>>,
}

#[derive(Deserialize)]
struct RawStatus {
    version: Version,
    players: Players,
    description: Option<Value>,
    favicon: Option<String>,
    #[serde(rename = "forgeData")]
    forge_data: Option<Value>,
    modinfo: Option<Value>,
    #[serde(rename = "enforcesSecureChat")]
    enforces_secure_chat: Option<bool>,
    #[serde(rename = "previewsChat")]
    previews_chat: Option<bool>,
}

impl JavaStatusResponse {
    /// Builds a response from the status JSON.
    pub fn from_json(json: &str, latency: Duration) -> Result<Self, ProtocolError> {
        let raw: Value = serde_json::from_str(json)?;
        let status = RawStatus::deserialize(&raw)?;

        let forge_data = status
            .forge_data
            .or(status.modinfo)
            .filter(|v| !v.is_null())
            .map(|v| ForgeData::from_json(&v))
            .transpose()?;

        Ok(Self {
            version: status.version,
            players: status.players,
            motd: status
                .description
                .map_or_else(|| Motd::parse("", false), |d| Motd::from_json(&d, false)),
            favicon: status.favicon,
            forge_data,
            enforces_secure_chat: status.enforces_secure_chat,
            previews_chat: status.previews_chat,
            latency,
            raw,
        })
    }

    /// Decodes the favicon into PNG bytes.
    #[must_use]
    pub fn favicon_bytes(&self) -> Option<Vec<u8>> {
        let favicon = self.favicon.as_deref()?;
        let data = favicon
            .strip_prefix("data:image/png;base64,")
            .unwrap_or(favicon);
        STANDARD.decode(data.replace('\n', "")).ok()
    }
}

/// Packets sent to the server during the status exchange.
#[derive(Debug)]
pub(crate) enum Serverbound<'a> {
    Handshake {
        version: i32,
        host: &'a str,
        port: u16,
        next_state: i32,
    },
    Request {},
    Ping {
        payload: u64,
    },
}

impl Serverbound<'_> {
    fn into_packet(self) -> Packet {
        let mut buf = ByteCursor::new();
        let id = match self {
            Self::Handshake {
                version,
                host,
                port,
                next_state,
            } => {
                buf.write_varint(version);
                buf.write_utf8_string(host);
                buf.write_u16(port);
                buf.write_varint(next_state);
                0x00
            }
            Self::Request {} => 0x00,
            Self::Ping { payload } => {
                buf.write_u64(payload);
                0x01
            }
        };
        Packet::new(id, buf)
    }
}

#[derive(Debug)]
enum JavaState {
    New,
    Handshaking,
    AwaitingStatus { sent_at: Instant },
    StatusReceived { status: Box<JavaStatusResponse> },
    AwaitingPong { status: Box<JavaStatusResponse>, sent_at: Instant },
    Closed(Option<Box<JavaStatusResponse>>),
}

/// The modern status exchange, independent of any socket.
///
/// [`poll_transmit`](Self::poll_transmit) yields the packets to send,
/// [`handle`](Self::handle) consumes the packets received, and
/// [`take_response`](Self::take_response) returns the result once the
/// exchange is over. Any error closes the session.
#[derive(Debug)]
pub struct JavaSession {
    host: String,
    port: u16,
    protocol_version: i32,
    nonce: Option<u64>,
    state: JavaState,
}

impl JavaSession {
    /// `nonce` is the ping payload; `None` skips the ping.
    #[must_use]
    pub fn new(address: &Address, protocol_version: i32, nonce: Option<u64>) -> Self {
        Self {
            host: address.host.clone(),
            port: address.port,
            protocol_version,
            nonce,
            state: JavaState::New,
        }
    }

    /// The stage the next packet to receive belongs to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self.state {
            JavaState::New => Stage::Handshake,
            JavaState::Handshaking => Stage::StatusRequest,
            JavaState::AwaitingStatus { .. } | JavaState::Closed(_) => Stage::StatusResponse,
            JavaState::StatusReceived { .. } => Stage::Ping,
            JavaState::AwaitingPong { .. } => Stage::Pong,
        }
    }

    /// The next packet to send, if any.
    pub fn poll_transmit(&mut self, now: Instant) -> Option<(Stage, Packet)> {
        let (stage, next, packet) = match std::mem::replace(&mut self.state, JavaState::Closed(None)) {
            JavaState::New => (
                Stage::Handshake,
                JavaState::Handshaking,
                Serverbound::Handshake {
                    version: self.protocol_version,
                    host: &self.host,
                    port: self.port,
                    next_state: 1,
                },
            ),
            JavaState::Handshaking => (
                Stage::StatusRequest,
                JavaState::AwaitingStatus { sent_at: now },
                Serverbound::Request {},
            ),
            JavaState::StatusReceived { status } => match self.nonce {
                Some(payload) => (
                    Stage::Ping,
                    JavaState::AwaitingPong {
                        status,
                        sent_at: now,
                    },
                    Serverbound::Ping { payload },
                ),
                None => {
                    self.state = JavaState::Closed(Some(status));
                    return None;
                }
            },
            other => {
                self.state = other;
                return None;
            }
        };
        debug!(%stage, "sending");
        self.state = next;
        Some((stage, packet.into_packet()))
    }

    /// Consumes a received packet.
    pub fn handle(&mut self, mut packet: Packet, now: Instant) -> Result<(), Error> {
        match std::mem::replace(&mut self.state, JavaState::Closed(None)) {
            JavaState::AwaitingStatus { sent_at } => {
                let stage = Stage::StatusResponse;
                packet.expect_id(0x00).at(stage)?;
                let json = packet.payload.read_utf8_string(MAX_PACKET_LENGTH).at(stage)?;
                let status = JavaStatusResponse::from_json(&json, now - sent_at).at(stage)?;
                debug!(
                    version = %status.version.name,
                    online = status.players.online,
                    "status received"
                );
                self.state = if self.nonce.is_some() {
                    JavaState::StatusReceived {
                        status: Box::new(status),
                    }
                } else {
                    JavaState::Closed(Some(Box::new(status)))
                };
                Ok(())
            }
            JavaState::AwaitingPong { mut status, sent_at } => {
                let stage = Stage::Pong;
                packet.expect_id(0x01).at(stage)?;
                let payload = packet.payload.read_u64().at(stage)?;
                let expected = self.nonce.unwrap_or_default();
                if payload != expected {
                    return Err(Error::protocol(
                        stage,
                        ProtocolError::NonceMismatch {
                            expected,
                            actual: payload,
                        },
                    ));
                }
                status.latency = now - sent_at;
                debug!(latency = ?status.latency, "pong received");
                self.state = JavaState::Closed(Some(status));
                Ok(())
            }
            other => {
                debug!(id = packet.id, "ignoring packet outside of a read");
                self.state = other;
                Ok(())
            }
        }
    }

    /// The response, once the exchange has completed.
    pub fn take_response(&mut self) -> Option<JavaStatusResponse> {
        match &mut self.state {
            JavaState::Closed(status) => status.take().map(|status| *status),
            _ => None,
        }
    }
}

/// Runs a session to completion over a blocking stream.
pub fn exchange<T>(
    transport: &mut T,
    session: &mut JavaSession,
    deadline: Instant,
) -> Result<JavaStatusResponse, Error>
where
    T: StreamTransport + ?Sized,
{
    loop {
        while let Some((stage, packet)) = session.poll_transmit(Instant::now()) {
            transport.send_packet(&packet, deadline, stage)?;
        }
        if let Some(status) = session.take_response() {
            return Ok(status);
        }
        let packet = transport.receive_packet(deadline, session.stage())?;
        session.handle(packet, Instant::now())?;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{test_util::unhex, transport::mock::MockStream};

    const STATUS_REPLY: &str = "7200707B226465736372697074696F6E223A2241204D696E65637261667420536572766572222C22706C6179657273223A7B2\
        26D6178223A32302C226F6E6C696E65223A307D2C2276657273696F6E223A7B226E616D65223A22312E382D70726531222C22\
        70726F746F636F6C223A34347D7D";
    const PONG: &str = "09010000000000DD7D1C";
    const NONCE: u64 = 14_515_484;

    fn session(nonce: Option<u64>) -> JavaSession {
        JavaSession::new(&Address::new("localhost", 25565), 44, nonce)
    }

    fn far() -> Instant {
        deadline_after(Duration::from_secs(5))
    }

    fn run(incoming: &str, nonce: Option<u64>) -> (Result<JavaStatusResponse, Error>, MockStream) {
        let mut stream = MockStream::new(&unhex(incoming));
        let result = exchange(&mut stream, &mut session(nonce), far());
        (result, stream)
    }

    #[test]
    fn handshake_then_request() {
        let mut session = session(None);
        let (stage, handshake) = session.poll_transmit(Instant::now()).unwrap();
        assert_eq!(stage, Stage::Handshake);
        assert_eq!(handshake.encode(), unhex("0F002C096C6F63616C686F737463DD01"));

        let (stage, request) = session.poll_transmit(Instant::now()).unwrap();
        assert_eq!(stage, Stage::StatusRequest);
        assert_eq!(request.encode(), unhex("0100"));
        assert!(session.poll_transmit(Instant::now()).is_none());
        assert_eq!(session.stage(), Stage::StatusResponse);
    }

    #[test]
    fn status_with_ping() {
        let (status, stream) = run(&format!("{STATUS_REPLY}{PONG}"), Some(NONCE));
        let status = status.unwrap();
        assert_eq!(
            status.raw,
            json!({
                "description": "A Minecraft Server",
                "players": {"max": 20, "online": 0},
                "version": {"name": "1.8-pre1", "protocol": 44},
            })
        );
        assert_eq!(status.version.protocol, 44);
        assert_eq!(status.motd.to_plain(), "A Minecraft Server");

        let mut expected = unhex("0F002C096C6F63616C686F737463DD01");
        expected.extend(unhex("0100"));
        expected.extend(unhex(PONG));
        assert_eq!(stream.written, expected);
    }

    #[test]
    fn status_without_ping() {
        let (status, stream) = run(STATUS_REPLY, None);
        assert_eq!(status.unwrap().players.max, 20);
        assert_eq!(stream.written.len(), 16 + 2);
    }

    #[test]
    fn invalid_json() {
        let (status, _) = run("0300017B", None);
        assert!(matches!(
            status,
            Err(Error::Protocol {
                stage: Stage::StatusResponse,
                source: ProtocolError::Json(_)
            })
        ));
    }

    #[test]
    fn wrong_status_packet() {
        let (status, _) = run("0105", None);
        assert!(matches!(
            status,
            Err(Error::Protocol {
                stage: Stage::StatusResponse,
                source: ProtocolError::UnexpectedPacket {
                    expected: 0,
                    actual: 5
                }
            })
        ));
    }

    #[test]
    fn wrong_pong_packet() {
        let (status, _) = run(&format!("{STATUS_REPLY}011F"), Some(NONCE));
        assert!(matches!(
            status,
            Err(Error::Protocol {
                stage: Stage::Pong,
                source: ProtocolError::UnexpectedPacket { .. }
            })
        ));
    }

    #[test]
    fn mangled_pong() {
        let (status, _) = run(&format!("{STATUS_REPLY}{PONG}"), Some(12345));
        assert!(matches!(
            status,
            Err(Error::Protocol {
                stage: Stage::Pong,
                source: ProtocolError::NonceMismatch {
                    expected: 12345,
                    actual: NONCE
                }
            })
        ));
    }

    #[test]
    fn silent_server_times_out_on_pong() {
        let (status, _) = run(STATUS_REPLY, Some(NONCE));
        assert!(matches!(status, Err(Error::Timeout { stage: Stage::Pong })));
    }

    #[test]
    fn missing_description_is_an_empty_motd() {
        let status = JavaStatusResponse::from_json(
            r#"{"players":{"max":20,"online":0},"version":{"name":"1.8-pre1","protocol":44}}"#,
            Duration::ZERO,
        )
        .unwrap();
        assert!(status.motd.parsed.is_empty());
    }

    #[test]
    fn missing_players_is_an_error() {
        let err = JavaStatusResponse::from_json(
            r#"{"version":{"name":"1.8-pre1","protocol":44}}"#,
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(err.to_string().contains("players"));
    }

    #[test]
    fn modern_status_document() {
        let status = JavaStatusResponse::from_json(
            r#"{"description":"Hi","players":{"online":1,"max":20},"version":{"name":"1.19.3","protocol":761}}"#,
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(status.players.online, 1);
        assert_eq!(status.version.protocol, 761);
        assert_eq!(status.favicon, None);
        assert_eq!(status.forge_data, None);
    }

    #[test]
    fn rich_status_document() {
        let status = JavaStatusResponse::from_json(
            &json!({
                "description": {"text": "§aHi", "extra": [{"text": " there", "bold": true}]},
                "players": {
                    "online": 1,
                    "max": 20,
                    "sample": [{"name": "Dinnerbone", "id": "61699b2e-d327-4a01-9f1e-0ea8c3f06bc6"}],
                },
                "version": {"name": "1.19.3", "protocol": 761},
                "favicon": "data:image/png;base64,iVBORw0KGgo=",
                "enforcesSecureChat": true,
                "modinfo": {"type": "FML", "modList": [{"modid": "forge", "version": "14.23.5.2859"}]},
            })
            .to_string(),
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(status.motd.to_plain(), "Hi there");
        assert_eq!(status.players.sample.as_ref().unwrap()[0].name, "Dinnerbone");
        assert_eq!(status.enforces_secure_chat, Some(true));
        assert_eq!(status.previews_chat, None);
        assert_eq!(
            status.favicon_bytes().unwrap(),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
        );
        let forge = status.forge_data.unwrap();
        assert_eq!(forge.fml_network_version, 1);
        assert_eq!(forge.mods[0].id, "forge");
    }

    #[test]
    fn forge_1_20_status_document() {
        let json = json!({
            "description": "Forge",
            "players": {"max": 20, "online": 0},
            "version": {"name": "1.20.1", "protocol": 763},
            "forgeData": {
                "channels": [],
                "mods": [],
                "truncated": false,
                "fmlNetworkVersion": 3,
                "d": crate::forge::tests::fml3_d(),
            },
        });
        let status = JavaStatusResponse::from_json(&json.to_string(), Duration::ZERO).unwrap();
        let forge = status.forge_data.unwrap();
        assert_eq!(forge.fml_network_version, 3);
        assert_eq!(forge.mods.len(), 2);
        assert_eq!(forge.channels.len(), 4);
        assert_eq!(status.motd.to_plain(), "Forge");
    }
}
