//! Multicast group address + port

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::error::ChannelError;

/// A validated multicast group and port.
///
/// The group is always inside 224.0.0.0/4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MulticastEndpoint {
    group: Ipv4Addr,
    port: u16,
}

impl MulticastEndpoint {
    pub fn new(group: Ipv4Addr, port: u16) -> Result<Self, ChannelError> {
        if !group.is_multicast() {
            return Err(ChannelError::InvalidEndpoint(format!(
                "{} is not in 224.0.0.0-239.255.255.255",
                group
            )));
        }
        Ok(Self { group, port })
    }

    /// Build from the two text fields a UI typically supplies.
    pub fn parse(group: &str, port: &str) -> Result<Self, ChannelError> {
        let group: Ipv4Addr = group.trim().parse().map_err(|_| {
            ChannelError::InvalidEndpoint(format!("'{}' is not an IPv4 address", group.trim()))
        })?;
        let port: u16 = port.trim().parse().map_err(|_| {
            ChannelError::InvalidEndpoint(format!("'{}' is not a port in 0-65535", port.trim()))
        })?;
        Self::new(group, port)
    }

    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Destination address for datagrams sent to the group
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }
}

impl FromStr for MulticastEndpoint {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, port) = s.rsplit_once(':').ok_or_else(|| {
            ChannelError::InvalidEndpoint(format!("'{}' is not of the form group:port", s))
        })?;
        Self::parse(group, port)
    }
}

impl fmt::Display for MulticastEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.port)
    }
}
