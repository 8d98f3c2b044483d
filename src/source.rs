//! H.264 Annex B elementary stream reader
//!
//! Feeds the streamer from a `.h264` file the way an encoder callback would:
//! parameter sets as they change, then one access unit at a time. The file is
//! read incrementally, NAL units are cut at start codes and grouped into
//! access units at picture boundaries.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use crate::constants::DEFAULT_FPS;
use crate::error::SourceError;
use crate::rtp::frame::{Frame, ParameterSet};
use crate::rtp::h264::{is_vcl, nal_type, NAL_PPS, NAL_SPS};

const READ_CHUNK: usize = 64 * 1024;
const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// What the source produces, in stream order
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// SPS/PPS changed; always precedes the first frame that uses it
    ParameterSet(ParameterSet),
    Frame(Frame),
}

/// Iterator over the parameter sets and access units of an Annex B stream
pub struct AnnexBSource<R = File> {
    reader: R,
    buf: BytesMut,
    scanned: usize,
    eof: bool,
    finished: bool,
    frame_interval: Duration,
    frame_index: u32,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    published: Option<ParameterSet>,
    access_unit: Vec<Bytes>,
    has_vcl: bool,
    pending: VecDeque<Result<SourceEvent, SourceError>>,
}

impl AnnexBSource<File> {
    pub fn open(path: impl AsRef<Path>, fps: f64) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        tracing::info!("Reading H.264 stream from {}", path.display());
        Ok(Self::new(file, fps))
    }
}

impl<R: Read> AnnexBSource<R> {
    /// Wrap any reader. A non-positive frame rate falls back to the default.
    pub fn new(reader: R, fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            tracing::warn!("Invalid frame rate {}, using {}", fps, DEFAULT_FPS);
            DEFAULT_FPS
        };

        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            scanned: 0,
            eof: false,
            finished: false,
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            frame_index: 0,
            sps: None,
            pps: None,
            published: None,
            access_unit: Vec::new(),
            has_vcl: false,
            pending: VecDeque::new(),
        }
    }

    /// Time between consecutive frames
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Frames produced so far
    pub fn frames(&self) -> u32 {
        self.frame_index
    }

    fn fill(&mut self) -> io::Result<()> {
        let start = self.buf.len();
        self.buf.resize(start + READ_CHUNK, 0);
        let read = loop {
            match self.reader.read(&mut self.buf[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e);
                }
            }
        };
        self.buf.truncate(start + read);
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    /// Next NAL unit without start code, or `None` at end of stream
    fn next_unit(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            let Some(start) = find_start_code(&self.buf, 0) else {
                if self.eof {
                    self.buf.clear();
                    return Ok(None);
                }
                // Bytes before the first start code are not NAL data, but
                // the tail may be the beginning of one
                let discard = self.buf.len().saturating_sub(2);
                let _ = self.buf.split_to(discard);
                self.fill()?;
                continue;
            };

            let body = start + 3;
            match find_start_code(&self.buf, self.scanned.max(body)) {
                Some(next) => {
                    let unit = trim_trailing_zeros(self.buf.split_to(next).freeze().slice(body..));
                    self.scanned = 0;
                    if !unit.is_empty() {
                        return Ok(Some(unit));
                    }
                }
                None if self.eof => {
                    let unit = trim_trailing_zeros(self.buf.split().freeze().slice(body..));
                    self.scanned = 0;
                    if !unit.is_empty() {
                        return Ok(Some(unit));
                    }
                }
                None => {
                    self.scanned = self.buf.len().saturating_sub(2).max(body);
                    self.fill()?;
                }
            }
        }
    }

    fn push_unit(&mut self, unit: Bytes) {
        let unit_type = nal_type(&unit);
        let vcl = is_vcl(unit_type);

        // A new picture starts at a slice with first_mb_in_slice == 0, or at
        // any non-VCL unit following the picture's slices
        let starts_picture = !vcl || unit.get(1).is_some_and(|b| b & 0x80 != 0);
        if self.has_vcl && starts_picture {
            self.flush_access_unit();
        }

        match unit_type {
            NAL_SPS => self.sps = Some(unit),
            NAL_PPS => self.pps = Some(unit),
            _ => {
                self.has_vcl |= vcl;
                self.access_unit.push(unit);
            }
        }
    }

    fn flush_access_unit(&mut self) {
        if !self.has_vcl {
            self.access_unit.clear();
            return;
        }

        if let (Some(sps), Some(pps)) = (&self.sps, &self.pps) {
            let current = ParameterSet::new(sps.clone(), pps.clone());
            if self.published.as_ref() != Some(&current) {
                self.published = Some(current.clone());
                self.pending
                    .push_back(Ok(SourceEvent::ParameterSet(current)));
            }
        }

        let size = self
            .access_unit
            .iter()
            .map(|unit| START_CODE.len() + unit.len())
            .sum();
        let mut payload = BytesMut::with_capacity(size);
        for unit in self.access_unit.drain(..) {
            payload.put_slice(&START_CODE);
            payload.put_slice(&unit);
        }

        let pts = self.frame_interval * self.frame_index;
        self.frame_index += 1;
        self.has_vcl = false;
        self.pending
            .push_back(Ok(SourceEvent::Frame(Frame::new(payload.freeze(), pts))));
    }
}

impl<R: Read> Iterator for AnnexBSource<R> {
    type Item = Result<SourceEvent, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }

            match self.next_unit() {
                Ok(Some(unit)) => self.push_unit(unit),
                Ok(None) => {
                    self.finished = true;
                    self.flush_access_unit();
                    tracing::debug!("End of stream after {} frames", self.frame_index);
                    if self.published.is_none() {
                        self.pending.push_back(Err(SourceError::NoParameterSet));
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(SourceError::Io(e)));
                }
            }
        }
    }
}

fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(3)
        .position(|w| w == [0, 0, 1])
        .map(|pos| pos + from)
}

fn trim_trailing_zeros(mut unit: Bytes) -> Bytes {
    let end = unit.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
    unit.truncate(end);
    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPS_A: &[u8] = &[0x67, 0x42, 0x00, 0x1F];
    const SPS_B: &[u8] = &[0x67, 0x42, 0x00, 0x28];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

    fn annexb(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, unit) in units.iter().enumerate() {
            // Mix 4- and 3-byte start codes
            if i % 2 == 0 {
                out.extend_from_slice(&[0, 0, 0, 1]);
            } else {
                out.extend_from_slice(&[0, 0, 1]);
            }
            out.extend_from_slice(unit);
        }
        out
    }

    fn sample_stream() -> Vec<u8> {
        annexb(&[
            &[0x09, 0xF0],
            SPS_A,
            PPS,
            &[0x06, 0x05, 0x01],
            &[0x65, 0x88, 0x84, 0x21],
            &[0x41, 0x9A, 0x11],
            &[0x41, 0x9A, 0x22],
            &[0x41, 0x40, 0x33],
            SPS_B,
            PPS,
            &[0x65, 0x88, 0x84, 0x44],
        ])
    }

    /// Hands out one byte per read
    struct Trickle(io::Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
    }

    fn describe(events: Vec<Result<SourceEvent, SourceError>>) -> Vec<String> {
        events
            .into_iter()
            .map(|event| match event {
                Ok(SourceEvent::ParameterSet(ps)) => format!("ps {:02x}", ps.sps[3]),
                Ok(SourceEvent::Frame(frame)) => {
                    let types: Vec<String> = crate::rtp::h264::split_annexb(&frame.payload)
                        .iter()
                        .map(|unit| nal_type(unit).to_string())
                        .collect();
                    format!("frame {}ms [{}]", frame.pts.as_millis(), types.join(","))
                }
                Err(e) => format!("error {}", e),
            })
            .collect()
    }

    fn expected() -> Vec<String> {
        vec![
            "ps 1f".to_string(),
            "frame 0ms [9,6,5]".to_string(),
            "frame 40ms [1]".to_string(),
            "frame 80ms [1,1]".to_string(),
            "ps 28".to_string(),
            "frame 120ms [5]".to_string(),
        ]
    }

    #[test]
    fn test_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&sample_stream()).unwrap();
        file.flush().unwrap();

        let source = AnnexBSource::open(file.path(), 25.0).unwrap();
        assert_eq!(describe(source.collect()), expected());
    }

    #[test]
    fn test_unit_boundaries_across_reads() {
        let source = AnnexBSource::new(Trickle(io::Cursor::new(sample_stream())), 25.0);
        assert_eq!(describe(source.collect()), expected());
    }

    #[test]
    fn test_frame_payload_is_annexb() {
        let mut source = AnnexBSource::new(io::Cursor::new(sample_stream()), 25.0);
        let _params = source.next().unwrap().unwrap();
        let Some(Ok(SourceEvent::Frame(frame))) = source.next() else {
            panic!("expected a frame");
        };
        assert_eq!(
            &frame.payload[..],
            &[
                0, 0, 0, 1, 0x09, 0xF0, 0, 0, 0, 1, 0x06, 0x05, 0x01, 0, 0, 0, 1, 0x65, 0x88,
                0x84, 0x21
            ]
        );
    }

    #[test]
    fn test_missing_parameter_set_reported_at_end() {
        let stream = annexb(&[&[0x41, 0x9A, 0x11]]);
        let events = describe(AnnexBSource::new(io::Cursor::new(stream), 30.0).collect());
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("frame 0ms"));
        assert!(events[1].starts_with("error Stream ended before SPS/PPS"));
    }

    #[test]
    fn test_read_error_ends_iteration() {
        let mut source = AnnexBSource::new(Failing, 30.0);
        assert!(matches!(source.next(), Some(Err(SourceError::Io(_)))));
        assert!(source.next().is_none());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = AnnexBSource::open(dir.path().join("absent.h264"), 30.0);
        assert!(matches!(result, Err(SourceError::Io(_))));
    }

    #[test]
    fn test_invalid_fps_falls_back() {
        let source = AnnexBSource::new(io::empty(), 0.0);
        assert_eq!(source.frame_interval(), Duration::from_secs_f64(1.0 / DEFAULT_FPS));
    }
}
