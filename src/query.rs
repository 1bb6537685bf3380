//! Implementation of the UDP Query protocol.
//! [Query](https://wiki.vg/Query)
//!
//! A handshake obtains a challenge token, which is then echoed in a basic or
//! full stat request. Every datagram carries the client's session id; replies
//! carrying another id are not ours and are dropped.

use std::{
    collections::BTreeMap,
    marker::PhantomData,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{
    cursor::{latin1, ByteCursor},
    error::{ProtocolError, ResultExt, Stage},
    motd::Motd,
    transport::{deadline_after, DatagramTransport, UdpTransport, MAX_DATAGRAM_SIZE},
    Address, Error, Pingable,
};

const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;
const FULL_STAT_PADDING: [u8; 4] = [0; 4];
/// The server only honours the low nibble of each session id byte.
const SESSION_ID_MASK: u32 = 0x0F0F_0F0F;
/// `splitnum\0\x80\0` before the full stat key/value section.
const FULL_STAT_PREFIX_LEN: usize = 11;
const PLAYER_SECTION: &[u8] = b"\x01player_\x00\x00";
/// Keys that can follow `hostname`, used to find where a MOTD containing NUL
/// bytes ends.
const KNOWN_KEYS: [&str; 9] = [
    "hostip",
    "hostport",
    "game_id",
    "gametype",
    "map",
    "maxplayers",
    "numplayers",
    "plugins",
    "version",
];

/// Configuration for querying a server with Query enabled.
///
/// The Query port is the server's `query.port`, which defaults to the game
/// port.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Query {
    pub address: Address,
    pub timeout: Duration,
}

impl Query {
    #[must_use]
    pub const fn new(address: Address, timeout: Duration) -> Self {
        Self { address, timeout }
    }

    /// Requests the full stat: every key, the plugin list and player names.
    pub fn full_stat(&self) -> Result<QueryResponse, Error> {
        self.run(QuerySession::<FullStat>::random())
    }

    /// Requests the basic stat.
    pub fn basic_stat(&self) -> Result<QueryBasicResponse, Error> {
        self.run(QuerySession::<BasicStat>::random())
    }

    fn run<K: StatKind>(&self, mut session: QuerySession<K>) -> Result<K::Response, Error> {
        let deadline = deadline_after(self.timeout);
        let mut transport = UdpTransport::connect(&self.address)?;
        exchange(&mut transport, &mut session, deadline)
    }
}

impl Pingable for Query {
    type Response = QueryResponse;

    fn ping(self) -> Result<Self::Response, Error> {
        self.full_stat()
    }
}

/// The two kinds of stat request.
pub trait StatKind {
    type Response;

    /// Whether the request carries the padding that asks for the full stat.
    const PADDED: bool;

    /// Decodes a stat reply, after its type and session id.
    fn decode(payload: &mut ByteCursor) -> Result<Self::Response, ProtocolError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FullStat;

#[derive(Debug, Clone, Copy)]
pub struct BasicStat;

impl StatKind for FullStat {
    type Response = QueryResponse;
    const PADDED: bool = true;

    fn decode(payload: &mut ByteCursor) -> Result<Self::Response, ProtocolError> {
        QueryResponse::decode(payload)
    }
}

impl StatKind for BasicStat {
    type Response = QueryBasicResponse;
    const PADDED: bool = false;

    fn decode(payload: &mut ByteCursor) -> Result<Self::Response, ProtocolError> {
        QueryBasicResponse::decode(payload)
    }
}

/// The full stat reply.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// Every key/value pair the server sent.
    pub raw: BTreeMap<String, String>,
    /// The `hostname` key, which is the MOTD.
    pub motd: Motd,
    /// Defaults to `world`.
    pub map_name: String,
    pub players: QueryPlayers,
    pub software: QuerySoftware,
    /// The IP the server is listening on, if it says.
    pub ip: Option<String>,
    pub port: Option<u16>,
    /// Always `SMP` on vanilla servers.
    pub game_type: String,
    /// Always `MINECRAFT` on vanilla servers.
    pub game_id: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct QueryPlayers {
    pub online: i64,
    pub max: i64,
    /// Names of the online players.
    pub list: Vec<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct QuerySoftware {
    pub version: String,
    /// The server software, such as `Paper`. `vanilla` when not reported.
    pub brand: String,
    /// Plugin names with their versions. Empty when hidden.
    pub plugins: Vec<String>,
}

impl QuerySoftware {
    /// Splits the `plugins` value, formatted as `brand: a 1.0; b 2.0`.
    #[must_use]
    pub fn parse(version: &str, plugins: &str) -> Self {
        let (brand, list) = match plugins.split_once(':') {
            _ if plugins.is_empty() => ("vanilla", Vec::new()),
            Some((brand, list)) => (brand, list.split(';').map(|s| s.trim().to_string()).collect()),
            None => (plugins, Vec::new()),
        };
        Self {
            version: version.to_string(),
            brand: brand.trim().to_string(),
            plugins: list,
        }
    }
}

fn count(raw: &BTreeMap<String, String>, field: &'static str) -> Result<i64, ProtocolError> {
    let value = raw.get(field).ok_or(ProtocolError::MissingField(field))?;
    value.parse().map_err(|_| ProtocolError::InvalidField {
        field,
        value: value.clone(),
    })
}

/// Reads the `hostname` value, which may itself contain NUL bytes: it ends
/// at the first NUL followed by a known key.
fn read_hostname(payload: &mut ByteCursor) -> Result<String, ProtocolError> {
    let rest = payload.remaining_slice();
    let end = rest
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == 0)
        .map(|(i, _)| i)
        .find(|&i| KNOWN_KEYS.iter().any(|key| rest[i + 1..].starts_with(key.as_bytes())));
    match end {
        Some(end) => {
            let bytes = payload.read_bytes(end)?;
            payload.skip(1)?;
            Ok(latin1(&bytes))
        }
        None => payload.read_cstring(),
    }
}

impl QueryResponse {
    /// Decodes a full stat reply, after its type and session id.
    pub fn decode(payload: &mut ByteCursor) -> Result<Self, ProtocolError> {
        payload.skip(FULL_STAT_PREFIX_LEN)?;

        let mut raw = BTreeMap::new();
        loop {
            let key = payload.read_cstring()?;
            if key.is_empty() {
                break;
            }
            let value = if key == "hostname" {
                read_hostname(payload)?
            } else {
                payload.read_cstring()?
            };
            raw.insert(key, value);
        }

        let section = payload.read_bytes(PLAYER_SECTION.len())?;
        if section != PLAYER_SECTION {
            return Err(ProtocolError::InvalidField {
                field: "player_",
                value: latin1(&section),
            });
        }
        let mut list = Vec::new();
        while !payload.is_empty() {
            let name = payload.read_cstring()?;
            if name.is_empty() {
                break;
            }
            list.push(name);
        }

        Self::from_raw(raw, list)
    }

    fn from_raw(raw: BTreeMap<String, String>, list: Vec<String>) -> Result<Self, ProtocolError> {
        let players = QueryPlayers {
            online: count(&raw, "numplayers")?,
            max: count(&raw, "maxplayers")?,
            list,
        };
        let get = |key: &str| raw.get(key).map(String::as_str);
        Ok(Self {
            motd: Motd::parse(get("hostname").unwrap_or_default(), false),
            map_name: get("map").unwrap_or("world").to_string(),
            players,
            software: QuerySoftware::parse(
                get("version").unwrap_or_default(),
                get("plugins").unwrap_or_default(),
            ),
            ip: get("hostip").map(str::to_string),
            port: get("hostport").and_then(|port| port.parse().ok()),
            game_type: get("gametype").unwrap_or("SMP").to_string(),
            game_id: get("game_id").unwrap_or("MINECRAFT").to_string(),
            raw,
        })
    }
}

/// The basic stat reply.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBasicResponse {
    pub motd: Motd,
    pub game_type: String,
    pub map_name: String,
    pub players_online: i64,
    pub players_max: i64,
    pub port: u16,
    pub host: String,
}

impl QueryBasicResponse {
    /// Decodes a basic stat reply, after its type and session id.
    pub fn decode(payload: &mut ByteCursor) -> Result<Self, ProtocolError> {
        let motd = payload.read_cstring()?;
        let game_type = payload.read_cstring()?;
        let map_name = payload.read_cstring()?;
        let mut raw = BTreeMap::new();
        raw.insert("numplayers".to_string(), payload.read_cstring()?);
        raw.insert("maxplayers".to_string(), payload.read_cstring()?);
        Ok(Self {
            motd: Motd::parse(&motd, false),
            game_type,
            map_name,
            players_online: count(&raw, "numplayers")?,
            players_max: count(&raw, "maxplayers")?,
            port: payload.read_u16_le()?,
            host: payload.read_cstring()?,
        })
    }
}

/// Parses the challenge token, which servers send as signed decimal but
/// some send as unsigned.
fn parse_challenge(token: &str) -> Result<i32, ProtocolError> {
    token
        .parse::<i32>()
        .or_else(|_| token.parse::<u32>().map(|token| token as i32))
        .map_err(|_| ProtocolError::InvalidField {
            field: "challenge",
            value: token.to_string(),
        })
}

#[derive(Debug)]
enum QueryState<R> {
    Unbound,
    HandshakeSent,
    ChallengeReceived { challenge: i32 },
    StatSent,
    Done(Option<R>),
}

/// The Query exchange, independent of any socket.
#[derive(Debug)]
pub struct QuerySession<K: StatKind> {
    session_id: u32,
    state: QueryState<K::Response>,
    kind: PhantomData<K>,
}

impl<K: StatKind> QuerySession<K> {
    /// A session with the given id, masked to what servers support.
    #[must_use]
    pub fn new(session_id: u32) -> Self {
        Self {
            session_id: session_id & SESSION_ID_MASK,
            state: QueryState::Unbound,
            kind: PhantomData,
        }
    }

    /// A session with a random id.
    #[must_use]
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    #[must_use]
    pub const fn session_id(&self) -> u32 {
        self.session_id
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self.state {
            QueryState::Unbound | QueryState::HandshakeSent => Stage::QueryHandshake,
            _ => Stage::QueryStat,
        }
    }

    fn header(&self, kind: u8) -> ByteCursor {
        let mut buf = ByteCursor::new();
        buf.write_bytes(&MAGIC);
        buf.write_u8(kind);
        buf.write_u32(self.session_id);
        buf
    }

    pub fn poll_transmit(&mut self, _now: Instant) -> Option<(Stage, Vec<u8>)> {
        match self.state {
            QueryState::Unbound => {
                debug!(session_id = self.session_id, "sending query handshake");
                self.state = QueryState::HandshakeSent;
                Some((Stage::QueryHandshake, self.header(TYPE_HANDSHAKE).into_inner()))
            }
            QueryState::ChallengeReceived { challenge } => {
                let mut buf = self.header(TYPE_STAT);
                buf.write_i32(challenge);
                if K::PADDED {
                    buf.write_bytes(&FULL_STAT_PADDING);
                }
                self.state = QueryState::StatSent;
                Some((Stage::QueryStat, buf.into_inner()))
            }
            _ => None,
        }
    }

    /// Consumes a received datagram. Datagrams that are not a reply to the
    /// request in flight are dropped.
    pub fn handle(&mut self, datagram: &[u8], _now: Instant) -> Result<(), Error> {
        let mut payload = ByteCursor::from(datagram);
        let (Ok(kind), Ok(session_id)) = (payload.read_u8(), payload.read_u32()) else {
            debug!(len = datagram.len(), "dropping short datagram");
            return Ok(());
        };
        if session_id != self.session_id {
            debug!(session_id, expected = self.session_id, "dropping datagram for another session");
            return Ok(());
        }

        let stage = self.stage();
        match self.state {
            QueryState::HandshakeSent if kind == TYPE_HANDSHAKE => {
                self.state = QueryState::Done(None);
                let token = payload.read_cstring().at(stage)?;
                let challenge = parse_challenge(token.trim()).at(stage)?;
                debug!(challenge, "challenge received");
                self.state = QueryState::ChallengeReceived { challenge };
            }
            QueryState::StatSent if kind == TYPE_STAT => {
                self.state = QueryState::Done(None);
                let response = K::decode(&mut payload).at(stage)?;
                self.state = QueryState::Done(Some(response));
            }
            _ => debug!(kind, "dropping unexpected datagram"),
        }
        Ok(())
    }

    pub fn take_response(&mut self) -> Option<K::Response> {
        match &mut self.state {
            QueryState::Done(response) => response.take(),
            _ => None,
        }
    }
}

/// Runs a session to completion over a blocking datagram socket.
pub fn exchange<T, K>(
    transport: &mut T,
    session: &mut QuerySession<K>,
    deadline: Instant,
) -> Result<K::Response, Error>
where
    T: DatagramTransport + ?Sized,
    K: StatKind,
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
