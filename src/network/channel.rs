//! Multicast channel: one UDP socket joined to one group
//!
//! Socket construction goes through socket2 so that `SO_REUSEADDR` can be set
//! before `bind()`: a listener and a sender for the same port routinely
//! coexist in one process.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::constants::{DEFAULT_RECV_TIMEOUT_MS, DEFAULT_TTL};
use crate::error::ChannelError;
use crate::network::endpoint::MulticastEndpoint;
use crate::network::interface::{LocalAddressProvider, LocalInterface};

/// What the channel is opened for. Both roles join the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Listen,
    Send,
}

/// Socket policy applied at open time
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub ttl: u32,
    pub recv_timeout: Duration,
    pub loopback: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            recv_timeout: Duration::from_millis(DEFAULT_RECV_TIMEOUT_MS),
            loopback: true,
        }
    }
}

impl From<&NetworkConfig> for ChannelOptions {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            ttl: config.ttl,
            recv_timeout: config.recv_timeout(),
            loopback: config.loopback,
        }
    }
}

/// Something datagrams can be received from
pub trait DatagramSource: Send {
    /// Receive one datagram. A timeout surfaces as `WouldBlock` or `TimedOut`.
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Address that identifies datagrams we sent ourselves
    fn local_address(&self) -> Ipv4Addr;

    fn close(&mut self);
}

/// Something datagrams can be sent to
pub trait DatagramSink: Send {
    fn send_datagram(&mut self, data: &[u8]) -> io::Result<usize>;

    fn close(&mut self);
}

/// Whether a receive error is just the periodic timeout
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn create_multicast_socket(
    endpoint: &MulticastEndpoint,
    local: &LocalInterface,
    options: &ChannelOptions,
) -> Result<UdpSocket, ChannelError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(ChannelError::setup("create socket"))?;
    socket
        .set_reuse_address(true)
        .map_err(ChannelError::setup("enable address reuse"))?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, endpoint.port());
    socket
        .bind(&bind_addr.into())
        .map_err(|e| ChannelError::from_bind(endpoint.port(), e))?;

    socket
        .set_multicast_if_v4(&local.address)
        .map_err(ChannelError::setup("select multicast interface"))?;
    socket
        .join_multicast_v4(&endpoint.group(), &local.address)
        .map_err(ChannelError::setup("join multicast group"))?;
    socket
        .set_read_timeout(Some(options.recv_timeout))
        .map_err(ChannelError::setup("set receive timeout"))?;
    socket
        .set_multicast_ttl_v4(options.ttl)
        .map_err(ChannelError::setup("set multicast TTL"))?;
    socket
        .set_multicast_loop_v4(options.loopback)
        .map_err(ChannelError::setup("set multicast loopback"))?;

    Ok(socket.into())
}

/// A UDP socket bound to the group's port and joined to the group
pub struct MulticastChannel {
    socket: Option<UdpSocket>,
    endpoint: MulticastEndpoint,
    local: LocalInterface,
    role: ChannelRole,
}

impl MulticastChannel {
    /// Open a channel with explicit socket options
    pub fn open(
        endpoint: MulticastEndpoint,
        role: ChannelRole,
        provider: &dyn LocalAddressProvider,
        options: &ChannelOptions,
    ) -> Result<Self, ChannelError> {
        let local = provider.resolve()?;
        let socket = create_multicast_socket(&endpoint, &local, options)?;

        tracing::debug!(
            "Opened {:?} channel on {} via {} (ttl={}, timeout={:?})",
            role,
            endpoint,
            local,
            options.ttl,
            options.recv_timeout
        );

        Ok(Self {
            socket: Some(socket),
            endpoint,
            local,
            role,
        })
    }

    fn socket(&self) -> io::Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is closed"))
    }

    /// Receive one datagram, waiting at most the configured timeout
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket()?.recv_from(buf)
    }

    /// Send one datagram to the group
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        self.socket()?.send_to(data, self.endpoint.socket_addr())
    }

    /// Leave the group and release the socket. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.leave_multicast_v4(&self.endpoint.group(), &self.local.address) {
                tracing::debug!("Leaving {} failed: {}", self.endpoint, e);
            }
            tracing::debug!("Closed {:?} channel on {}", self.role, self.endpoint);
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    pub fn endpoint(&self) -> MulticastEndpoint {
        self.endpoint
    }

    pub fn local_interface(&self) -> &LocalInterface {
        &self.local
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }
}

impl DatagramSource for MulticastChannel {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf)
    }

    fn local_address(&self) -> Ipv4Addr {
        self.local.address
    }

    fn close(&mut self) {
        MulticastChannel::close(self);
    }
}

impl DatagramSink for MulticastChannel {
    fn send_datagram(&mut self, data: &[u8]) -> io::Result<usize> {
        self.send(data)
    }

    fn close(&mut self) {
        MulticastChannel::close(self);
    }
}

impl Drop for MulticastChannel {
    fn drop(&mut self) {
        self.close();
    }
}
