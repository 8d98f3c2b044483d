//! H.264 NAL unit handling and RFC 6184 payload framing
//!
//! Packetization mode 1 (non-interleaved): single NAL unit packets, STAP-A
//! for the SPS/PPS pair, FU-A for NAL units larger than the payload budget.

use bytes::{BufMut, Bytes, BytesMut};

pub const NAL_TYPE_MASK: u8 = 0x1F;
pub const NAL_REF_IDC_MASK: u8 = 0x60;
pub const NAL_FORBIDDEN_BIT: u8 = 0x80;

pub const NAL_SLICE: u8 = 1;
pub const NAL_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;
pub const NAL_FILLER: u8 = 12;
pub const NAL_STAP_A: u8 = 24;
pub const NAL_FU_A: u8 = 28;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;
const FU_OVERHEAD: usize = 2;
const STAP_A_LENGTH_SIZE: usize = 2;

/// Smallest payload budget that still fits one FU-A fragment byte
pub const MIN_PAYLOAD: usize = FU_OVERHEAD + 1;

/// NAL unit type of a unit without start code. Empty input yields 0.
pub fn nal_type(nalu: &[u8]) -> u8 {
    nalu.first().map_or(0, |b| b & NAL_TYPE_MASK)
}

/// Video coding layer units (coded slices)
pub fn is_vcl(nal_type: u8) -> bool {
    (NAL_SLICE..=NAL_IDR).contains(&nal_type)
}

/// Split an Annex B byte stream into NAL units, start codes removed.
///
/// Both 3- and 4-byte start codes are accepted. Input without any start code
/// is returned as a single NAL unit.
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    if starts.is_empty() {
        return if data.is_empty() { Vec::new() } else { vec![data] };
    }

    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).map_or(data.len(), |next| next - 3);
        let mut nalu = &data[start..end];
        // Leading zero of a following 4-byte start code, or trailing_zero_8bits
        while let [rest @ .., 0] = nalu {
            nalu = rest;
        }
        if !nalu.is_empty() {
            units.push(nalu);
        }
    }
    units
}

/// Cuts NAL units into RTP payloads no larger than `max_payload`
#[derive(Debug, Clone, Copy)]
pub struct H264Payloader {
    max_payload: usize,
}

impl H264Payloader {
    pub fn new(max_payload: usize) -> Self {
        assert!(max_payload >= MIN_PAYLOAD, "payload budget too small for FU-A");
        Self { max_payload }
    }

    /// `None` when `max_payload` cannot carry an FU-A fragment
    pub fn try_new(max_payload: usize) -> Option<Self> {
        (max_payload >= MIN_PAYLOAD).then_some(Self { max_payload })
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Payloads for one NAL unit: the unit itself if it fits, FU-A otherwise
    pub fn payload_nal(&self, nalu: &Bytes, out: &mut Vec<Bytes>) {
        if nalu.is_empty() {
            return;
        }
        if nalu.len() <= self.max_payload {
            out.push(nalu.clone());
            return;
        }

        let indicator = (nalu[0] & (NAL_FORBIDDEN_BIT | NAL_REF_IDC_MASK)) | NAL_FU_A;
        let unit_type = nalu[0] & NAL_TYPE_MASK;
        let body = &nalu[1..];
        let chunk_size = self.max_payload - FU_OVERHEAD;
        let last = (body.len() - 1) / chunk_size;

        for (i, chunk) in body.chunks(chunk_size).enumerate() {
            let mut fu_header = unit_type;
            if i == 0 {
                fu_header |= FU_START;
            }
            if i == last {
                fu_header |= FU_END;
            }

            let mut buf = BytesMut::with_capacity(FU_OVERHEAD + chunk.len());
            buf.put_u8(indicator);
            buf.put_u8(fu_header);
            buf.put_slice(chunk);
            out.push(buf.freeze());
        }
    }

    /// SPS and PPS aggregated into one STAP-A when they fit, separately otherwise
    pub fn payload_parameter_set(&self, sps: &Bytes, pps: &Bytes, out: &mut Vec<Bytes>) {
        if sps.is_empty() || pps.is_empty() {
            self.payload_nal(sps, out);
            self.payload_nal(pps, out);
            return;
        }

        let aggregate_len = 1 + STAP_A_LENGTH_SIZE * 2 + sps.len() + pps.len();
        if aggregate_len > self.max_payload {
            self.payload_nal(sps, out);
            self.payload_nal(pps, out);
            return;
        }

        let nri = (sps[0] & NAL_REF_IDC_MASK).max(pps[0] & NAL_REF_IDC_MASK);
        let forbidden = (sps[0] | pps[0]) & NAL_FORBIDDEN_BIT;

        let mut buf = BytesMut::with_capacity(aggregate_len);
        buf.put_u8(forbidden | nri | NAL_STAP_A);
        buf.put_u16(sps.len() as u16);
        buf.put_slice(sps);
        buf.put_u16(pps.len() as u16);
        buf.put_slice(pps);
        out.push(buf.freeze());
    }
}
