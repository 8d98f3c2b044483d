//! Command-line options shared by the binaries

use clap::Args;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::error::Error;
use crate::network::endpoint::MulticastEndpoint;

/// Network overrides applied on top of the config file
#[derive(Debug, Clone, Default, Args)]
pub struct NetworkArgs {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Interface to join the group on, e.g. "wlan0"
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Local IPv4 address to use instead of looking up an interface
    #[arg(long)]
    pub local_address: Option<Ipv4Addr>,

    /// Multicast TTL
    #[arg(long)]
    pub ttl: Option<u32>,

    /// Do not deliver our own datagrams back to local listeners
    #[arg(long)]
    pub no_loopback: bool,
}

impl NetworkArgs {
    /// Load the config file and apply command-line overrides
    pub fn load_config(&self) -> Result<AppConfig, Error> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(interface) = &self.interface {
            config.network.interface = Some(interface.clone());
        }
        if let Some(address) = self.local_address {
            config.network.local_address = Some(address);
        }
        if let Some(ttl) = self.ttl {
            config.network.ttl = ttl;
        }
        if self.no_loopback {
            config.network.loopback = false;
        }
    }
}

/// The endpoint given on the command line, else the configured default
pub fn resolve_endpoint(
    endpoint: Option<MulticastEndpoint>,
    config: &AppConfig,
) -> Result<MulticastEndpoint, Error> {
    match endpoint {
        Some(endpoint) => Ok(endpoint),
        None => config.network.endpoint(),
    }
}
