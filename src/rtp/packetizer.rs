//! H.264 access units to RTP packets
//!
//! Runs synchronously on the video source's thread. Produced packets go to a
//! [`PacketSink`] that must never block, so an encoder callback is never
//! held up by network I/O.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::constants::RTP_HEADER_SIZE;
use crate::error::StreamError;
use crate::rtp::frame::{Frame, ParameterSet};
use crate::rtp::h264::{
    nal_type, split_annexb, H264Payloader, MIN_PAYLOAD, NAL_AUD, NAL_FILLER, NAL_IDR,
};
use crate::rtp::packet::{RtpHeader, RtpPacket};

/// Destination for finished packets
pub trait PacketSink: Send + Sync {
    /// Queue one packet. Returns false if the sink refused it.
    fn enqueue(&self, packet: RtpPacket) -> bool;
}

impl<T: PacketSink + ?Sized> PacketSink for Arc<T> {
    fn enqueue(&self, packet: RtpPacket) -> bool {
        (**self).enqueue(packet)
    }
}

/// Packetizer counters
#[derive(Debug, Default)]
pub struct PacketizerStats {
    pub frames_packetized: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub packets_produced: AtomicU64,
    pub packets_refused: AtomicU64,
    pub bytes_produced: AtomicU64,
}

/// Stream identity and running counters. Never reset while the packetizer
/// lives.
#[derive(Debug)]
struct StreamState {
    ssrc: u32,
    sequence: u16,
    timestamp_base: u32,
    last_ticks: Option<u64>,
}

impl StreamState {
    fn next_sequence(&mut self) -> u16 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    /// RTP timestamp for a frame, strictly later than the previous frame's
    fn timestamp_for(&mut self, pts: Duration, clock_rate: u32) -> u32 {
        let mut ticks = (pts.as_micros() * clock_rate as u128 / 1_000_000) as u64;
        if let Some(last) = self.last_ticks {
            if ticks <= last {
                ticks = last + 1;
            }
        }
        self.last_ticks = Some(ticks);
        self.timestamp_base.wrapping_add(ticks as u32)
    }
}

/// Payloader for the configured MTU, which must leave room for the RTP header
/// and one FU-A fragment
pub fn payloader_for(config: &StreamConfig) -> Result<H264Payloader, StreamError> {
    config
        .mtu
        .checked_sub(RTP_HEADER_SIZE)
        .and_then(H264Payloader::try_new)
        .ok_or(StreamError::Mtu {
            mtu: config.mtu,
            min: RTP_HEADER_SIZE + MIN_PAYLOAD,
        })
}

/// Turns access units into RTP packets (RFC 6184, packetization mode 1)
pub struct RtpPacketizer<S: PacketSink> {
    parameter_set: RwLock<Option<Arc<ParameterSet>>>,
    state: Mutex<StreamState>,
    payloader: H264Payloader,
    payload_type: u8,
    clock_rate: u32,
    sink: S,
    stats: PacketizerStats,
}

impl<S: PacketSink> RtpPacketizer<S> {
    /// New packetizer with random SSRC, initial sequence and timestamp base
    pub fn new(config: &StreamConfig, sink: S) -> Result<Self, StreamError> {
        Self::with_initial_state(config, sink, rand::random(), rand::random(), rand::random())
    }

    pub fn with_initial_state(
        config: &StreamConfig,
        sink: S,
        ssrc: u32,
        sequence: u16,
        timestamp_base: u32,
    ) -> Result<Self, StreamError> {
        let payloader = payloader_for(config)?;
        Ok(Self {
            parameter_set: RwLock::new(None),
            state: Mutex::new(StreamState {
                ssrc,
                sequence,
                timestamp_base,
                last_ticks: None,
            }),
            payloader,
            payload_type: config.payload_type,
            clock_rate: config.clock_rate,
            sink,
            stats: PacketizerStats::default(),
        })
    }

    /// Publish a new SPS/PPS pair, replacing any previous one
    pub fn set_parameter_set(&self, parameter_set: ParameterSet) {
        tracing::debug!(
            "Parameter set updated (sps {} bytes, pps {} bytes)",
            parameter_set.sps.len(),
            parameter_set.pps.len()
        );
        *self.parameter_set.write() = Some(Arc::new(parameter_set));
    }

    /// Snapshot of the current parameter set
    pub fn parameter_set(&self) -> Option<Arc<ParameterSet>> {
        self.parameter_set.read().clone()
    }

    /// Packetize one access unit and hand every packet to the sink.
    ///
    /// Frames arriving before any parameter set are discarded. Returns the
    /// number of packets produced.
    pub fn submit(&self, frame: Frame) -> usize {
        let Some(params) = self.parameter_set() else {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Dropping frame: no SPS/PPS yet");
            return 0;
        };

        let units: Vec<Bytes> = split_annexb(&frame.payload)
            .into_iter()
            .filter(|nalu| !matches!(nal_type(nalu), NAL_AUD | NAL_FILLER))
            .map(|nalu| frame.payload.slice_ref(nalu))
            .collect();

        if units.is_empty() {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return 0;
        }

        let mut payloads = Vec::with_capacity(units.len() + 1);
        if units.iter().any(|nalu| nal_type(nalu) == NAL_IDR) {
            self.payloader
                .payload_parameter_set(&params.sps, &params.pps, &mut payloads);
        }
        for nalu in &units {
            self.payloader.payload_nal(nalu, &mut payloads);
        }

        // Held across enqueue so sequence order matches queue order even
        // with several submitting threads
        let mut state = self.state.lock();
        let timestamp = state.timestamp_for(frame.pts, self.clock_rate);
        let last = payloads.len() - 1;

        for (i, payload) in payloads.iter().enumerate() {
            let header = RtpHeader {
                marker: i == last,
                payload_type: self.payload_type,
                sequence: state.next_sequence(),
                timestamp,
                ssrc: state.ssrc,
            };
            let packet = header.write(payload);
            let len = packet.len() as u64;

            if self.sink.enqueue(packet) {
                self.stats.packets_produced.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_produced.fetch_add(len, Ordering::Relaxed);
            } else {
                self.stats.packets_refused.fetch_add(1, Ordering::Relaxed);
            }
        }
        drop(state);

        self.stats.frames_packetized.fetch_add(1, Ordering::Relaxed);
        payloads.len()
    }

    pub fn ssrc(&self) -> u32 {
        self.state.lock().ssrc
    }

    pub fn stats(&self) -> &PacketizerStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
