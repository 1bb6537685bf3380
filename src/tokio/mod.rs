//! Suspending implementations on top of the tokio runtime.
//!
//! The drivers here feed the same sessions as the blocking ones, so both
//! produce identical outcomes for identical bytes.

mod bedrock;
mod java;
mod legacy;
mod query;
pub mod transport;

use async_trait::async_trait;

pub use self::{
    bedrock::exchange as bedrock_exchange,
    java::exchange as java_exchange,
    legacy::exchange as legacy_exchange,
    query::{basic_stat, exchange as query_exchange, full_stat},
};
use crate::Error;

/// Represents a pingable entity.
#[async_trait]
pub trait AsyncPingable {
    /// The type of response that is expected in reply to the ping.
    type Response;

    /// Ping the entity, gathering the latency and response.
    async fn ping(self) -> Result<Self::Response, Error>;
}

/// Retrieve the status of a given Minecraft server using a `AsyncPingable` configuration.
///
/// # Examples
///
/// Ping a Java server, skipping the latency ping:
///
/// ```no_run
/// # async {
/// use mcstat::{Address, Java};
/// use std::time::Duration;
///
/// let status = mcstat::tokio::get_status(Java {
///     ping: false,
///     ..Java::new(Address::new("mc.hypixel.net", 25565), Duration::from_secs(5))
/// })
/// .await?;
/// # Ok::<(), mcstat::Error>(())
/// # };
/// ```
///
/// Ping a Bedrock server:
///
/// ```no_run
/// # async {
/// use mcstat::{Address, Bedrock};
/// use std::time::Duration;
///
/// let status = mcstat::tokio::get_status(Bedrock::new(
///     Address::new("play.nethergames.org", 19132),
///     Duration::from_secs(5),
/// ))
/// .await?;
/// # Ok::<(), mcstat::Error>(())
/// # };
/// ```
pub async fn get_status<P: AsyncPingable>(pingable: P) -> Result<P::Response, Error> {
    pingable.ping().await
}
