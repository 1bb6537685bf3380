use std::{fmt, net::Ipv6Addr};

use crate::Error;

/// A server address as a host and port pair.
///
/// SRV records are never consulted. A host name is resolved by the operating
/// system's resolver when connecting, through `ToSocketAddrs` or tokio's
/// `lookup_host`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`, using `default_port`
    /// when none is given.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcstat::Address;
    ///
    /// let address = Address::parse("mc.example.com", 25565)?;
    /// assert_eq!(address, Address::new("mc.example.com", 25565));
    ///
    /// let address = Address::parse("[::1]:19133", 19132)?;
    /// assert_eq!(address.host, "::1");
    /// assert_eq!(address.port, 19133);
    /// # Ok::<(), mcstat::Error>(())
    /// ```
    pub fn parse(address: &str, default_port: u16) -> Result<Self, Error> {
        let invalid = || Error::InvalidAddress(address.to_string());
        let trimmed = address.trim();

        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, rest) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match rest {
                "" => None,
                rest => Some(rest.strip_prefix(':').ok_or_else(invalid)?),
            };
            (host, port)
        } else if trimmed.parse::<Ipv6Addr>().is_ok() {
            (trimmed, None)
        } else {
            match trimmed.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (trimmed, None),
            }
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => default_port,
        };

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl<S: Into<String>> From<(S, u16)> for Address {
    fn from((host, port): (S, u16)) -> Self {
        Self::new(host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_without_port_uses_default() {
        assert_eq!(
            Address::parse("127.0.0.1", 25565).unwrap(),
            Address::new("127.0.0.1", 25565)
        );
    }

    #[test]
    fn explicit_port_wins() {
        assert_eq!(
            Address::parse("example.org:1234", 25565).unwrap(),
            Address::new("example.org", 1234)
        );
    }

    #[test]
    fn ipv6() {
        assert_eq!(
            Address::parse("[2001:db8::1]:25566", 25565).unwrap(),
            Address::new("2001:db8::1", 25566)
        );
        assert_eq!(
            Address::parse("[::1]", 19132).unwrap(),
            Address::new("::1", 19132)
        );
        assert_eq!(
            Address::parse("::1", 19132).unwrap(),
            Address::new("::1", 19132)
        );
    }

    #[test]
    fn invalid_addresses() {
        for bad in ["", ":25565", "host:", "host:99999", "host:abc", "[::1", "[::1]x", "a b"] {
            assert!(
                matches!(Address::parse(bad, 25565), Err(Error::InvalidAddress(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn display() {
        assert_eq!(Address::new("localhost", 25565).to_string(), "localhost:25565");
        assert_eq!(Address::new("::1", 19132).to_string(), "[::1]:19132");
    }
}
