//! Local interface resolution
//!
//! The channel needs one IPv4 address: it selects the outgoing multicast
//! interface, the group is joined on it, and received datagrams whose source
//! matches it are labelled as our own. Resolution is behind a trait so tests
//! and unusual setups can pin the address.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::ChannelError;

/// A resolved local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub address: Ipv4Addr,
}

impl fmt::Display for LocalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Supplies the local address a channel binds its multicast membership to
pub trait LocalAddressProvider: Send + Sync {
    fn resolve(&self) -> Result<LocalInterface, ChannelError>;
}

/// Always resolves to the same address
#[derive(Debug, Clone, Copy)]
pub struct FixedAddress(pub Ipv4Addr);

impl LocalAddressProvider for FixedAddress {
    fn resolve(&self) -> Result<LocalInterface, ChannelError> {
        Ok(LocalInterface {
            name: "fixed".to_string(),
            address: self.0,
        })
    }
}

/// Looks the address up from the host's network interfaces.
///
/// With a name, the first IPv4 address of that interface is used. Without
/// one, the host's primary IPv4 address is used and the owning interface is
/// located for logging.
#[derive(Debug, Clone, Default)]
pub struct SystemInterface {
    interface: Option<String>,
}

impl SystemInterface {
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }

    pub fn named(interface: impl Into<String>) -> Self {
        Self {
            interface: Some(interface.into()),
        }
    }
}

fn list_ipv4_interfaces() -> Result<Vec<(String, Ipv4Addr)>, ChannelError> {
    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| ChannelError::Interface(e.to_string()))?;

    Ok(interfaces
        .into_iter()
        .filter_map(|(name, ip)| match ip {
            IpAddr::V4(v4) => Some((name, v4)),
            IpAddr::V6(_) => None,
        })
        .collect())
}

impl LocalAddressProvider for SystemInterface {
    fn resolve(&self) -> Result<LocalInterface, ChannelError> {
        let interfaces = list_ipv4_interfaces()?;

        if let Some(wanted) = &self.interface {
            return interfaces
                .into_iter()
                .find(|(name, _)| name == wanted)
                .map(|(name, address)| LocalInterface { name, address })
                .ok_or_else(|| {
                    ChannelError::Interface(format!("no IPv4 address on interface '{}'", wanted))
                });
        }

        let address = match local_ip_address::local_ip() {
            Ok(IpAddr::V4(v4)) => v4,
            Ok(IpAddr::V6(v6)) => {
                return Err(ChannelError::Interface(format!(
                    "primary address {} is not IPv4",
                    v6
                )))
            }
            Err(e) => return Err(ChannelError::Interface(e.to_string())),
        };

        let name = interfaces
            .into_iter()
            .find(|(_, ip)| *ip == address)
            .map(|(name, _)| name)
            .ok_or_else(|| {
                ChannelError::Interface(format!("no interface owns address {}", address))
            })?;

        Ok(LocalInterface { name, address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_address() {
        let iface = FixedAddress(Ipv4Addr::new(192, 168, 1, 7)).resolve().unwrap();
        assert_eq!(iface.address, Ipv4Addr::new(192, 168, 1, 7));
        assert_eq!(iface.to_string(), "fixed (192.168.1.7)");
    }

    #[test]
    fn test_unknown_interface_name() {
        let err = SystemInterface::named("no-such-iface-0").resolve().unwrap_err();
        assert!(matches!(err, ChannelError::Interface(_)));
    }

    #[test]
    fn test_system_resolution() {
        // Hosts without a routable IPv4 address (sandboxes, CI) cannot resolve
        if let Ok(iface) = SystemInterface::default().resolve() {
            assert!(!iface.address.is_unspecified());
            assert!(!iface.name.is_empty());
        }
    }
}
