//! RTP fixed header and wire packets (RFC 3550)
//!
//! Only the 12-byte fixed header is produced: no padding, no header
//! extension, no CSRC list.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use std::ops::Deref;

use crate::constants::RTP_HEADER_SIZE;

const RTP_VERSION: u8 = 2;

/// RTP fixed header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

/// Why a buffer is not an RTP packet we understand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    TooShort(usize),
    BadVersion(u8),
    Unsupported,
}

impl RtpHeader {
    /// Serialize the header followed by `payload` into one packet
    pub fn write(&self, payload: &[u8]) -> RtpPacket {
        let mut buf = BytesMut::with_capacity(RTP_HEADER_SIZE + payload.len());
        self.write_into(&mut buf);
        buf.put_slice(payload);
        RtpPacket::from(buf.freeze())
    }

    /// Serialize the header alone; callers append the payload
    pub fn write_into(&self, buf: &mut BytesMut) {
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }

    /// Parse the fixed header, returning it with the payload slice.
    ///
    /// Packets carrying CSRCs, extensions or padding are rejected since
    /// nothing here produces them.
    pub fn parse(data: &[u8]) -> Result<(RtpHeader, &[u8]), ParseError> {
        if data.len() < RTP_HEADER_SIZE {
            return Err(ParseError::TooShort(data.len()));
        }
        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(ParseError::BadVersion(version));
        }
        if data[0] & 0x3F != 0 {
            return Err(ParseError::Unsupported);
        }

        let header = RtpHeader {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7F,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        };
        Ok((header, &data[RTP_HEADER_SIZE..]))
    }
}

/// One serialized RTP packet, ready to go out as a single datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    buffer: Bytes,
}

impl RtpPacket {
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Parse this packet's header back out
    pub fn header(&self) -> Result<RtpHeader, ParseError> {
        RtpHeader::parse(&self.buffer).map(|(header, _)| header)
    }

    pub fn payload(&self) -> &[u8] {
        self.buffer.get(RTP_HEADER_SIZE..).unwrap_or(&[])
    }
}

impl From<Bytes> for RtpPacket {
    fn from(buffer: Bytes) -> Self {
        Self { buffer }
    }
}

impl Deref for RtpPacket {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buffer
    }
}
