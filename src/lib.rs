#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::missing_errors_doc
)]
//! `mcstat` implements the protocols Minecraft servers answer status
//! requests with, and renders the MOTDs they return.
//!
//! - [`Java`]: the modern server list ping, with optional latency ping.
//! - [`Legacy`]: the three pre-1.7 ping formats.
//! - [`Query`]: the UDP Query protocol, basic and full stat.
//! - [`Bedrock`]: the RakNet unconnected ping.
//!
//! Every client takes an [`Address`] as given: SRV records are never looked
//! up, and host names are left to the operating system's resolver. Each protocol is a sans-IO session driven by a blocking
//! driver, or by the tokio driver in [`tokio`] with the `tokio-runtime`
//! feature. The main API surface is [`get_status`].

#[cfg(feature = "tokio-runtime")]
pub mod tokio;

pub mod address;
pub mod bedrock;
pub mod cursor;
pub mod error;
pub mod forge;
pub mod java;
pub mod legacy;
pub mod motd;
pub mod packet;
pub mod query;
pub mod transport;

pub use address::Address;
pub use bedrock::{Bedrock, BedrockEdition, BedrockStatusResponse};
pub use error::{Error, ProtocolError, Stage};
pub use forge::{ForgeChannel, ForgeData, ForgeMod};
pub use java::{Java, JavaStatusResponse, Player, Players, Version};
pub use legacy::{Legacy, LegacyStatusResponse, LegacyVariant};
pub use motd::Motd;
pub use query::{Query, QueryBasicResponse, QueryResponse};

/// Represents a pingable entity.
pub trait Pingable {
    /// The type of response that is expected in reply to the ping.
    type Response;

    /// Ping the entity, gathering the latency and response.
    ///
    /// The connection is opened and closed within this call.
    fn ping(self) -> Result<Self::Response, Error>;
}

/// Retrieve the status of a given Minecraft server using a `Pingable` configuration.
///
/// # Examples
///
/// Ping a Java server:
///
/// ```no_run
/// use mcstat::{Address, Java};
/// use std::time::Duration;
///
/// let status = mcstat::get_status(Java::new(
///     Address::parse("mc.hypixel.net", mcstat::java::DEFAULT_PORT)?,
///     Duration::from_secs(5),
/// ))?;
/// println!("{} ({:?})", status.motd.to_plain(), status.latency);
/// # Ok::<(), mcstat::Error>(())
/// ```
///
/// Ping a Bedrock server:
///
/// ```no_run
/// use mcstat::{Address, Bedrock};
/// use std::time::Duration;
///
/// let status = mcstat::get_status(Bedrock::new(
///     Address::parse("play.nethergames.org", mcstat::bedrock::DEFAULT_PORT)?,
///     Duration::from_secs(5),
/// ))?;
/// println!("{}/{}", status.players_online, status.players_max);
/// # Ok::<(), mcstat::Error>(())
/// ```
pub fn get_status<P: Pingable>(pingable: P) -> Result<P::Response, Error> {
    pingable.ping()
}
