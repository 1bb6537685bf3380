//! Blocking TCP and UDP transports.
//!
//! Every operation takes an absolute deadline. Exceeding it is reported as
//! [`Error::Timeout`]; every other failure of the socket is
//! [`Error::Connection`].

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    time::{Duration, Instant},
};

use tracing::{debug, trace};

use crate::{
    cursor::{ByteCursor, MAX_PACKET_LENGTH, MAX_VARINT_LENGTH},
    error::{ResultExt, Stage},
    packet::Packet,
    Address, Error,
};

/// Largest datagram a UDP reply can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Returns the instant `timeout` from now, saturating far in the future.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(Duration::from_secs(60 * 60 * 24 * 365)))
        .unwrap_or(now)
}

/// Time left before `deadline`, or a timeout error once it has passed.
pub(crate) fn remaining(deadline: Instant, stage: Stage) -> Result<Duration, Error> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or(Error::Timeout { stage })
}

pub(crate) fn resolve(address: &Address) -> Result<Vec<SocketAddr>, Error> {
    let addrs: Vec<SocketAddr> = (address.host.as_str(), address.port)
        .to_socket_addrs()
        .map_err(|e| Error::io(Stage::Connect, e))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    Ok(addrs)
}

/// The unspecified local address of the same family as `peer`.
pub(crate) fn local_bind_address(peer: &SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}

/// A connected byte stream.
///
/// Implementors provide raw reads and writes; packet framing is built on top.
pub trait StreamTransport {
    /// Writes all of `bytes`.
    fn write_all(&mut self, bytes: &[u8], deadline: Instant, stage: Stage) -> Result<(), Error>;

    /// Reads exactly `n` bytes. A peer closing early is a connection error.
    fn read_exact(&mut self, n: usize, deadline: Instant, stage: Stage) -> Result<Vec<u8>, Error>;

    /// Shuts the stream down. Errors are ignored since nothing more is sent.
    fn close(&mut self) {}

    /// Writes one length-prefixed frame.
    fn send_packet(&mut self, packet: &Packet, deadline: Instant, stage: Stage) -> Result<(), Error> {
        self.write_all(&packet.encode(), deadline, stage)
    }

    /// Reads the VarInt length, then exactly that many bytes, then splits id
    /// and payload.
    fn receive_packet(&mut self, deadline: Instant, stage: Stage) -> Result<Packet, Error> {
        let mut prefix = ByteCursor::new();
        loop {
            let byte = self.read_exact(1, deadline, stage)?[0];
            prefix.write_u8(byte);
            if byte & 0x80 == 0 || prefix.remaining() == MAX_VARINT_LENGTH {
                break;
            }
        }
        let len = prefix.read_length(MAX_PACKET_LENGTH).at(stage)?;
        let body = self.read_exact(len, deadline, stage)?;
        Packet::decode(body).at(stage)
    }
}

/// A connected datagram socket.
pub trait DatagramTransport {
    fn send(&mut self, bytes: &[u8], deadline: Instant, stage: Stage) -> Result<(), Error>;

    /// Returns the next datagram, truncated to `max_size` bytes.
    fn receive(&mut self, max_size: usize, deadline: Instant, stage: Stage) -> Result<Vec<u8>, Error>;
}

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connects to the first reachable socket address of `address`.
    pub fn connect(address: &Address, deadline: Instant) -> Result<Self, Error> {
        let mut last_err = None;
        for addr in resolve(address)? {
            let timeout = remaining(deadline, Stage::Connect)?;
            debug!(%addr, ?timeout, "connecting");
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|e| Error::io(Stage::Connect, e))?;
                    return Ok(Self { stream });
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect failed");
                    last_err = Some(Error::io(Stage::Connect, e));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::InvalidAddress(address.to_string())))
    }
}

impl StreamTransport for TcpTransport {
    fn write_all(&mut self, bytes: &[u8], deadline: Instant, stage: Stage) -> Result<(), Error> {
        let timeout = remaining(deadline, stage)?;
        self.stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| Error::io(stage, e))?;
        self.stream.write_all(bytes).map_err(|e| Error::io(stage, e))?;
        trace!(len = bytes.len(), %stage, "wrote");
        Ok(())
    }

    fn read_exact(&mut self, n: usize, deadline: Instant, stage: Stage) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; n];
        let mut filled = 0;
        while filled < n {
            let timeout = remaining(deadline, stage)?;
            self.stream
                .set_read_timeout(Some(timeout))
                .map_err(|e| Error::io(stage, e))?;
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::io(stage, io::ErrorKind::UnexpectedEof.into()));
                }
                Ok(read) => filled += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::io(stage, e)),
            }
        }
        trace!(len = n, %stage, "read");
        Ok(buf)
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds an ephemeral local port and connects it to `address`.
    pub fn connect(address: &Address) -> Result<Self, Error> {
        let peer = resolve(address)?[0];
        let socket =
            UdpSocket::bind(local_bind_address(&peer)).map_err(|e| Error::io(Stage::Connect, e))?;
        socket.connect(peer).map_err(|e| Error::io(Stage::Connect, e))?;
        debug!(%peer, "udp socket connected");
        Ok(Self { socket })
    }
}

impl DatagramTransport for UdpTransport {
    fn send(&mut self, bytes: &[u8], deadline: Instant, stage: Stage) -> Result<(), Error> {
        let timeout = remaining(deadline, stage)?;
        self.socket
            .set_write_timeout(Some(timeout))
            .map_err(|e| Error::io(stage, e))?;
        self.socket.send(bytes).map_err(|e| Error::io(stage, e))?;
        trace!(len = bytes.len(), %stage, "sent datagram");
        Ok(())
    }

    fn receive(&mut self, max_size: usize, deadline: Instant, stage: Stage) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; max_size];
        loop {
            let timeout = remaining(deadline, stage)?;
            self.socket
                .set_read_timeout(Some(timeout))
                .map_err(|e| Error::io(stage, e))?;
            match self.socket.recv(&mut buf) {
                Ok(len) => {
                    trace!(len, %stage, "received datagram");
                    buf.truncate(len);
                    return Ok(buf);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::io(stage, e)),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory transports.

    use std::collections::VecDeque;

    use super::*;

    /// Replays `incoming` and records everything written. Running out of
    /// scripted bytes behaves like a silent peer: the read times out.
    #[derive(Debug, Default)]
    pub(crate) struct MockStream {
        pub incoming: ByteCursor,
        pub written: Vec<u8>,
        pub closed: bool,
    }

    impl MockStream {
        pub(crate) fn new(incoming: &[u8]) -> Self {
            Self {
                incoming: ByteCursor::from(incoming),
                ..Self::default()
            }
        }
    }

    impl StreamTransport for MockStream {
        fn write_all(&mut self, bytes: &[u8], _: Instant, _: Stage) -> Result<(), Error> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn read_exact(&mut self, n: usize, _: Instant, stage: Stage) -> Result<Vec<u8>, Error> {
            if self.incoming.remaining() < n {
                return Err(Error::Timeout { stage });
            }
            Ok(self.incoming.read_bytes(n).unwrap())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct MockDatagrams {
        pub incoming: VecDeque<Vec<u8>>,
        pub sent: Vec<Vec<u8>>,
    }

    impl MockDatagrams {
        pub(crate) fn new<I, D>(incoming: I) -> Self
        where
            I: IntoIterator<Item = D>,
            D: Into<Vec<u8>>,
        {
            Self {
                incoming: incoming.into_iter().map(Into::into).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl DatagramTransport for MockDatagrams {
        fn send(&mut self, bytes: &[u8], _: Instant, _: Stage) -> Result<(), Error> {
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        fn receive(&mut self, max_size: usize, _: Instant, stage: Stage) -> Result<Vec<u8>, Error> {
            let mut datagram = self.incoming.pop_front().ok_or(Error::Timeout { stage })?;
            datagram.truncate(max_size);
            Ok(datagram)
        }
    }
}
