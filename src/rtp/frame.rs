//! Media handed to the packetizer by a video source

use bytes::Bytes;
use std::time::Duration;

/// One encoded access unit in Annex B form
#[derive(Debug, Clone)]
pub struct Frame {
    pub payload: Bytes,
    /// Presentation time relative to the start of the stream
    pub pts: Duration,
}

impl Frame {
    pub fn new(payload: Bytes, pts: Duration) -> Self {
        Self { payload, pts }
    }

    /// Copy out of a buffer the source is about to reuse
    pub fn copy_from(data: &[u8], pts: Duration) -> Self {
        Self {
            payload: Bytes::copy_from_slice(data),
            pts,
        }
    }
}

/// The SPS/PPS pair a decoder needs before any frame.
///
/// Immutable once built; replaced wholesale when the encoder renegotiates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    pub sps: Bytes,
    pub pps: Bytes,
}

impl ParameterSet {
    pub fn new(sps: Bytes, pps: Bytes) -> Self {
        Self { sps, pps }
    }

    pub fn copy_from(sps: &[u8], pps: &[u8]) -> Self {
        Self {
            sps: Bytes::copy_from_slice(strip_start_code(sps)),
            pps: Bytes::copy_from_slice(strip_start_code(pps)),
        }
    }
}

/// Encoders commonly hand out SPS/PPS with an Annex B prefix still attached
fn strip_start_code(nalu: &[u8]) -> &[u8] {
    nalu.strip_prefix(&[0, 0, 0, 1])
        .or_else(|| nalu.strip_prefix(&[0, 0, 1]))
        .unwrap_or(nalu)
}
