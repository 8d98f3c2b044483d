//! # Multicast Tester
//!
//! Diagnostic tool for IP multicast on a LAN: join a group and print what
//! arrives, send text to a group, or stream H.264 video to it over RTP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         UI / binaries                                │
//! │   start/stop listening · send · hex toggle · start/stop streaming    │
//! └───────────────┬───────────────────────────────────▲──────────────────┘
//!                 │ Session (session)                 │ SessionEvent
//!                 ▼                                   │ (event)
//! ┌───────────────────────────────┐   ┌───────────────┴──────────────────┐
//! │ Listener thread               │   │ Sender thread (one per message)  │
//! │ (network::listener)           │   │ (network::sender)                │
//! │  recv (100 ms timeout)        │   │  open → send → close             │
//! │  → "[You] text" / "0xHH "     │   └──────────────────────────────────┘
//! └───────────────▲───────────────┘
//!                 │                    ┌──────────────────────────────────┐
//!                 │                    │ Video source (source / encoder)  │
//!                 │                    │  on_parameter_set · on_frame     │
//!                 │                    └───────────────┬──────────────────┘
//!                 │                                    ▼
//!                 │                    ┌──────────────────────────────────┐
//!                 │                    │ RTP packetizer (rtp)             │
//!                 │                    │  single NAL · STAP-A · FU-A      │
//!                 │                    └───────────────┬──────────────────┘
//!                 │                                    ▼ enqueue (FIFO)
//!                 │                    ┌──────────────────────────────────┐
//!                 │                    │ Dispatch thread (stream)         │
//!                 │                    └───────────────┬──────────────────┘
//!                 │                                    ▼
//! ┌───────────────┴────────────────────────────────────────────────────┐
//! │           MulticastChannel (network::channel) · UDP/IPv4             │
//! │      SO_REUSEADDR · bound to group port · joined on local iface      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod network;
pub mod rtp;
pub mod session;
pub mod source;
pub mod stream;

pub use error::{Error, Result};
pub use event::SessionEvent;
pub use session::Session;

/// Application-wide constants
pub mod constants {
    use std::net::Ipv4Addr;

    /// Default multicast group (organization-local scope)
    pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 1, 1, 1);

    /// Default UDP port
    pub const DEFAULT_PORT: u16 = 5000;

    /// Default multicast TTL: one router hop past the LAN
    pub const DEFAULT_TTL: u32 = 2;

    /// Receive timeout, which bounds how long a stop request can go unnoticed
    pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 100;

    /// Largest UDP payload over IPv4
    pub const MAX_DATAGRAM_SIZE: usize = 65_507;

    /// RTP fixed header size
    pub const RTP_HEADER_SIZE: usize = 12;

    /// Default maximum RTP packet size, leaving room for IP/UDP headers
    /// and common tunnel overhead
    pub const DEFAULT_RTP_MTU: usize = 1400;

    /// Smallest RTP packet size accepted in configuration
    pub const MIN_RTP_MTU: usize = 64;

    /// Dynamic payload type for H.264
    pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

    /// Video RTP clock
    pub const DEFAULT_CLOCK_RATE: u32 = 90_000;

    /// Frame rate used to pace file sources
    pub const DEFAULT_FPS: f64 = 30.0;
}
