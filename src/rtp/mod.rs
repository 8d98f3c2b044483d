//! RTP over multicast for H.264 video
//!
//! - `packet`: RTP fixed header serialization
//! - `h264`: NAL unit parsing and RFC 6184 framing
//! - `frame`: access units and parameter sets handed in by a video source
//! - `packetizer`: turns access units into sequenced, timestamped packets

pub mod frame;
pub mod h264;
pub mod packet;
pub mod packetizer;

pub use frame::{Frame, ParameterSet};
pub use h264::H264Payloader;
pub use packet::{RtpHeader, RtpPacket};
pub use packetizer::{PacketSink, PacketizerStats, RtpPacketizer};
