//! Application configuration
//!
//! Settings are optional: every field has a default, and a missing config
//! file simply yields [`AppConfig::default`]. Files are TOML and live in the
//! platform config directory unless a path is given explicitly.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::Error;
use crate::network::endpoint::MulticastEndpoint;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub console: ConsoleConfig,
}

/// Socket and group settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Default multicast group
    pub group: Ipv4Addr,

    /// Default UDP port
    pub port: u16,

    /// Multicast hop limit
    pub ttl: u32,

    /// Receive timeout; doubles as the stop-flag polling interval
    pub recv_timeout_ms: u64,

    /// Deliver our own datagrams back to local listeners
    pub loopback: bool,

    /// Interface name to bind to (e.g. "wlan0"). Primary interface when unset.
    pub interface: Option<String>,

    /// Explicit local address, bypasses interface lookup entirely
    pub local_address: Option<Ipv4Addr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            ttl: DEFAULT_TTL,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
            loopback: true,
            interface: None,
            local_address: None,
        }
    }
}

impl NetworkConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn endpoint(&self) -> Result<MulticastEndpoint, Error> {
        MulticastEndpoint::new(self.group, self.port).map_err(Error::from)
    }
}

/// RTP streaming settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Dynamic RTP payload type announced to receivers
    pub payload_type: u8,

    /// RTP clock rate in Hz
    pub clock_rate: u32,

    /// Maximum RTP packet size (header included)
    pub mtu: usize,

    /// Frame rate used when pacing file sources
    pub fps: f64,

    /// How long the dispatch thread waits on an empty queue before
    /// re-checking its stop flag
    pub dispatch_poll_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            payload_type: DEFAULT_PAYLOAD_TYPE,
            clock_rate: DEFAULT_CLOCK_RATE,
            mtu: DEFAULT_RTP_MTU,
            fps: DEFAULT_FPS,
            dispatch_poll_ms: DEFAULT_RECV_TIMEOUT_MS,
        }
    }
}

impl StreamConfig {
    pub fn dispatch_poll(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_ms)
    }
}

/// Console display settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Render payloads as `0xHH` bytes instead of text
    pub hex_display: bool,
}

impl AppConfig {
    /// Default config file location (`<config dir>/multicast-tester/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("net", "liveforcode", "multicast-tester")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.network.group.is_multicast() {
            return Err(Error::Config(format!(
                "group {} is not a multicast address",
                self.network.group
            )));
        }
        if self.network.ttl == 0 || self.network.ttl > 255 {
            return Err(Error::Config(format!("ttl {} out of range 1-255", self.network.ttl)));
        }
        if self.network.recv_timeout_ms == 0 {
            return Err(Error::Config("recv_timeout_ms must be positive".into()));
        }
        if self.stream.payload_type > 127 {
            return Err(Error::Config(format!(
                "payload type {} does not fit in 7 bits",
                self.stream.payload_type
            )));
        }
        if self.stream.clock_rate == 0 {
            return Err(Error::Config("clock_rate must be positive".into()));
        }
        if self.stream.mtu < MIN_RTP_MTU || self.stream.mtu > MAX_DATAGRAM_SIZE {
            return Err(Error::Config(format!(
                "mtu {} out of range {}-{}",
                self.stream.mtu, MIN_RTP_MTU, MAX_DATAGRAM_SIZE
            )));
        }
        if !(self.stream.fps > 0.0) {
            return Err(Error::Config("fps must be positive".into()));
        }
        if self.stream.dispatch_poll_ms == 0 {
            return Err(Error::Config("dispatch_poll_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.ttl, 2);
        assert_eq!(config.network.recv_timeout(), Duration::from_millis(100));
        assert_eq!(config.stream.clock_rate, 90_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [network]
            group = "239.1.1.1"
            port = 6000

            [console]
            hex_display = true
            "#,
        )
        .unwrap();

        assert_eq!(config.network.group, Ipv4Addr::new(239, 1, 1, 1));
        assert_eq!(config.network.port, 6000);
        assert_eq!(config.network.ttl, DEFAULT_TTL);
        assert!(config.console.hex_display);
        assert_eq!(config.stream.payload_type, DEFAULT_PAYLOAD_TYPE);
    }

    #[test]
    fn test_rejects_unicast_group() {
        let err = AppConfig::from_toml("[network]\ngroup = \"192.168.1.1\"\n").unwrap_err();
        assert!(err.to_string().contains("not a multicast"));
    }

    #[test]
    fn test_rejects_tiny_mtu() {
        let err = AppConfig::from_toml("[stream]\nmtu = 10\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.network.interface = Some("wlan0".into());
        config.stream.fps = 25.0;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.network.interface.as_deref(), Some("wlan0"));
        assert_eq!(loaded.stream.fps, 25.0);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.network.port, DEFAULT_PORT);
    }
}
