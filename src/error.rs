//! Error types shared by every client.

use std::{fmt, io, string::FromUtf8Error};

use crate::legacy::LegacyVariant;

/// The packet or phase of an exchange an error occurred in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Stage {
    Connect,
    Handshake,
    StatusRequest,
    StatusResponse,
    Ping,
    Pong,
    LegacyRequest,
    LegacyResponse,
    QueryHandshake,
    QueryStat,
    BedrockPing,
    BedrockPong,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Handshake => "handshake",
            Self::StatusRequest => "status request",
            Self::StatusResponse => "status response",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::LegacyRequest => "legacy ping request",
            Self::LegacyResponse => "legacy ping response",
            Self::QueryHandshake => "query handshake",
            Self::QueryStat => "query stat",
            Self::BedrockPing => "unconnected ping",
            Self::BedrockPong => "unconnected pong",
        })
    }
}

/// Errors that can occur when querying a server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The deadline passed while waiting on the network.
    #[error("timed out during {stage}")]
    Timeout { stage: Stage },
    /// The connection was refused, reset or otherwise failed.
    #[error("an I/O error occurred during {stage}: {source}")]
    Connection {
        stage: Stage,
        #[source]
        source: io::Error,
    },
    /// The peer answered with bytes that violate the protocol.
    #[error("protocol violation during {stage}: {source}")]
    Protocol {
        stage: Stage,
        #[source]
        source: ProtocolError,
    },
    /// A legacy server answered in a shape that the requested variant cannot speak.
    #[error("the server rejected the {variant} ping: {message:?}")]
    UnsupportedVariant {
        variant: LegacyVariant,
        message: String,
    },
    #[error("an invalid address was provided: {0:?}")]
    InvalidAddress(String),
}

impl Error {
    /// Classifies an I/O error, keeping timeouts apart from connection failures.
    pub(crate) fn io(stage: Stage, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout { stage },
            _ => Self::Connection { stage, source },
        }
    }

    pub(crate) const fn protocol(stage: Stage, source: ProtocolError) -> Self {
        Self::Protocol { stage, source }
    }

    /// The stage the error occurred in, if it belongs to an exchange.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Timeout { stage } | Self::Connection { stage, .. } | Self::Protocol { stage, .. } => {
                Some(*stage)
            }
            Self::UnsupportedVariant { .. } => Some(Stage::LegacyResponse),
            Self::InvalidAddress(_) => None,
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A decode failure, before it is tied to a stage.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("needed {needed} more bytes but only {remaining} remain")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("VarInt is longer than 5 bytes")]
    VarIntTooLong,
    #[error("negative length {0}")]
    NegativeLength(i32),
    #[error("declared length {length} exceeds the limit of {limit}")]
    LengthTooLarge { length: usize, limit: usize },
    #[error("invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
    #[error("invalid UTF-16 string")]
    InvalidUtf16,
    #[error("expected packet {expected:#04x} but received {actual:#04x}")]
    UnexpectedPacket { expected: i32, actual: i32 },
    #[error("pong payload {actual} does not match ping payload {expected}")]
    NonceMismatch { expected: u64, actual: u64 },
    #[error("incorrect offline message data ID received")]
    BadMagic,
    #[error("a JSON error occurred: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value {value:?} for field `{field}`")]
    InvalidField { field: &'static str, value: String },
    #[error("expected {expected} fields but received {actual}")]
    FieldCount { expected: &'static str, actual: usize },
}

pub(crate) trait ResultExt<T> {
    /// Attaches the stage a decode failure happened in.
    fn at(self, stage: Stage) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, ProtocolError> {
    fn at(self, stage: Stage) -> Result<T, Error> {
        self.map_err(|source| Error::protocol(stage, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_io_is_a_timeout() {
        let err = Error::io(Stage::Pong, io::Error::from(io::ErrorKind::TimedOut));
        assert!(err.is_timeout());
        assert_eq!(err.stage(), Some(Stage::Pong));

        let err = Error::io(Stage::Connect, io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_timeout());
    }

    #[test]
    fn reset_io_is_a_connection_error() {
        let err = Error::io(
            Stage::StatusResponse,
            io::Error::from(io::ErrorKind::ConnectionReset),
        );
        assert!(matches!(err, Error::Connection { stage: Stage::StatusResponse, .. }));
    }

    #[test]
    fn messages_name_the_stage() {
        let err: Result<(), _> = Err(ProtocolError::BadMagic);
        let err = err.at(Stage::BedrockPong).unwrap_err();
        assert_eq!(
            err.to_string(),
            "protocol violation during unconnected pong: incorrect offline message data ID received"
        );
    }
}
