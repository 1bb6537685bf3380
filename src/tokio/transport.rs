//! Suspending TCP and UDP transports on top of tokio.
//!
//! The contract is that of [`crate::transport`]: an absolute deadline per
//! operation, [`Error::Timeout`] when it passes and [`Error::Connection`] for
//! anything else the socket reports.

use std::{io, net::SocketAddr, time::Instant};

use ::tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, TcpStream, UdpSocket},
    time::{timeout_at, Instant as TokioInstant},
};
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::{
    cursor::{ByteCursor, MAX_PACKET_LENGTH, MAX_VARINT_LENGTH},
    error::{ResultExt, Stage},
    packet::Packet,
    transport::{local_bind_address, remaining},
    Address, Error,
};

/// Runs `future` until `deadline`, mapping both its failure and the deadline
/// passing onto `stage`.
async fn until<T, F>(deadline: Instant, stage: Stage, future: F) -> Result<T, Error>
where
    F: std::future::Future<Output = io::Result<T>>,
{
    remaining(deadline, stage)?;
    match timeout_at(TokioInstant::from_std(deadline), future).await {
        Ok(result) => result.map_err(|e| Error::io(stage, e)),
        Err(_) => Err(Error::Timeout { stage }),
    }
}

async fn resolve(address: &Address, deadline: Instant) -> Result<Vec<SocketAddr>, Error> {
    let addrs: Vec<SocketAddr> = until(
        deadline,
        Stage::Connect,
        lookup_host((address.host.as_str(), address.port)),
    )
    .await?
    .collect();
    if addrs.is_empty() {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    Ok(addrs)
}

/// A connected byte stream whose operations suspend.
#[async_trait]
pub trait AsyncStreamTransport: Send {
    async fn write_all(&mut self, bytes: &[u8], deadline: Instant, stage: Stage) -> Result<(), Error>;

    /// Reads exactly `n` bytes. A peer closing early is a connection error.
    async fn read_exact(&mut self, n: usize, deadline: Instant, stage: Stage) -> Result<Vec<u8>, Error>;

    async fn close(&mut self) {}

    async fn send_packet(&mut self, packet: &Packet, deadline: Instant, stage: Stage) -> Result<(), Error> {
        self.write_all(&packet.encode(), deadline, stage).await
    }

    async fn receive_packet(&mut self, deadline: Instant, stage: Stage) -> Result<Packet, Error> {
        let mut prefix = ByteCursor::new();
        loop {
            let byte = self.read_exact(1, deadline, stage).await?[0];
            prefix.write_u8(byte);
            if byte & 0x80 == 0 || prefix.remaining() == MAX_VARINT_LENGTH {
                break;
            }
        }
        let len = prefix.read_length(MAX_PACKET_LENGTH).at(stage)?;
        let body = self.read_exact(len, deadline, stage).await?;
        Packet::decode(body).at(stage)
    }
}

/// A connected datagram socket whose operations suspend.
#[async_trait]
pub trait AsyncDatagramTransport: Send {
    async fn send(&mut self, bytes: &[u8], deadline: Instant, stage: Stage) -> Result<(), Error>;

    /// Returns the next datagram, truncated to `max_size` bytes.
    async fn receive(&mut self, max_size: usize, deadline: Instant, stage: Stage) -> Result<Vec<u8>, Error>;
}

pub struct TokioTcpTransport {
    stream: TcpStream,
}

impl TokioTcpTransport {
    /// Connects to the first reachable socket address of `address`.
    pub async fn connect(address: &Address, deadline: Instant) -> Result<Self, Error> {
        let mut last_err = None;
        for addr in resolve(address, deadline).await? {
            debug!(%addr, "connecting");
            match until(deadline, Stage::Connect, TcpStream::connect(addr)).await {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|e| Error::io(Stage::Connect, e))?;
                    return Ok(Self { stream });
                }
                Err(e @ Error::Timeout { .. }) => return Err(e),
                Err(e) => {
                    debug!(%addr, error = %e, "connect failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::InvalidAddress(address.to_string())))
    }
}

#[async_trait]
impl AsyncStreamTransport for TokioTcpTransport {
    async fn write_all(&mut self, bytes: &[u8], deadline: Instant, stage: Stage) -> Result<(), Error> {
        until(deadline, stage, self.stream.write_all(bytes)).await?;
        trace!(len = bytes.len(), %stage, "wrote");
        Ok(())
    }

    async fn read_exact(&mut self, n: usize, deadline: Instant, stage: Stage) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; n];
        until(deadline, stage, self.stream.read_exact(&mut buf)).await?;
        trace!(len = n, %stage, "read");
        Ok(buf)
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

pub struct TokioUdpTransport {
    socket: UdpSocket,
}

impl TokioUdpTransport {
    /// Binds an ephemeral local port and connects it to `address`.
    pub async fn connect(address: &Address, deadline: Instant) -> Result<Self, Error> {
        let peer = resolve(address, deadline).await?[0];
        let socket = UdpSocket::bind(local_bind_address(&peer))
            .await
            .map_err(|e| Error::io(Stage::Connect, e))?;
        socket
            .connect(peer)
            .await
            .map_err(|e| Error::io(Stage::Connect, e))?;
        debug!(%peer, "udp socket connected");
        Ok(Self { socket })
    }
}

#[async_trait]
impl AsyncDatagramTransport for TokioUdpTransport {
    async fn send(&mut self, bytes: &[u8], deadline: Instant, stage: Stage) -> Result<(), Error> {
        until(deadline, stage, self.socket.send(bytes)).await?;
        trace!(len = bytes.len(), %stage, "sent datagram");
        Ok(())
    }

    async fn receive(&mut self, max_size: usize, deadline: Instant, stage: Stage) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; max_size];
        let len = until(deadline, stage, self.socket.recv(&mut buf)).await?;
        trace!(len, %stage, "received datagram");
        buf.truncate(len);
        Ok(buf)
    }
}
