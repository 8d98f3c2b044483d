//! Error types for the multicast tester

use std::io;

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Multicast channel setup errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Invalid multicast endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Cannot bind address or port {port}.{}", bind_hint(.port))]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Cannot {stage}: {source}")]
    Setup {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Cannot resolve local interface: {0}")]
    Interface(String),
}

fn bind_hint(port: &u16) -> &'static str {
    if *port < 1024 {
        " Try binding to a port larger than 1024."
    } else {
        ""
    }
}

impl ChannelError {
    /// Classify a failed `bind()` call.
    ///
    /// Address conflicts and privilege problems become [`ChannelError::Bind`],
    /// anything else is a plain setup failure.
    pub fn from_bind(port: u16, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::AddrInUse
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::PermissionDenied => ChannelError::Bind { port, source },
            _ => ChannelError::Setup {
                stage: "bind socket",
                source,
            },
        }
    }

    pub fn setup(stage: &'static str) -> impl FnOnce(io::Error) -> ChannelError {
        move |source| ChannelError::Setup { stage, source }
    }

    pub fn is_bind(&self) -> bool {
        matches!(self, ChannelError::Bind { .. })
    }
}

/// Single-message send errors
#[derive(Error, Debug)]
pub enum SendError {
    #[error("{0}")]
    Open(#[from] ChannelError),

    #[error("Failed to transmit message: {0}")]
    Transmit(#[source] io::Error),

    #[error("Datagram truncated: sent {sent} of {expected} bytes")]
    Truncated { sent: usize, expected: usize },
}

/// RTP streaming errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{0}")]
    Open(#[from] ChannelError),

    #[error("Failed to start dispatch thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Failed to dispatch RTP packet: {0}")]
    Dispatch(#[source] io::Error),

    #[error("MTU of {mtu} bytes leaves no room for H.264 payload (minimum {min})")]
    Mtu { mtu: usize, min: usize },
}

/// Video source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read video source: {0}")]
    Io(#[from] io::Error),

    #[error("Stream ended before SPS/PPS were found")]
    NoParameterSet,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_suggests_high_port() {
        let err = ChannelError::from_bind(80, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(err.is_bind());
        let msg = err.to_string();
        assert!(msg.contains("port 80"));
        assert!(msg.contains("larger than 1024"));
    }

    #[test]
    fn test_bind_error_high_port_has_no_hint() {
        let err = ChannelError::from_bind(5000, io::Error::from(io::ErrorKind::AddrInUse));
        assert!(err.is_bind());
        assert!(!err.to_string().contains("1024"));
    }

    #[test]
    fn test_other_bind_failures_are_setup_errors() {
        let err = ChannelError::from_bind(5000, io::Error::from(io::ErrorKind::InvalidInput));
        assert!(!err.is_bind());
        assert!(err.to_string().starts_with("Cannot bind socket"));
    }
}
