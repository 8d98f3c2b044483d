//! A running RTP stream: packetizer, dispatch thread and sending channel

use std::sync::Arc;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::event::{emit, EventSender, SessionEvent};
use crate::network::channel::{ChannelOptions, ChannelRole, MulticastChannel};
use crate::network::endpoint::MulticastEndpoint;
use crate::network::interface::LocalAddressProvider;
use crate::rtp::frame::{Frame, ParameterSet};
use crate::rtp::packetizer::{payloader_for, PacketizerStats, RtpPacketizer};
use crate::stream::dispatch::{DispatchQueue, DispatchStats, DispatchThread, ExitHook};

/// What a video source holds on to while a stream is running.
///
/// Cloneable and usable from any thread. Once the stream stops, submitted
/// frames are still packetized but every packet is refused.
#[derive(Clone)]
pub struct StreamHandle {
    packetizer: Arc<RtpPacketizer<DispatchQueue>>,
}

impl StreamHandle {
    /// Encoder callback for a new SPS/PPS pair. Start codes are tolerated.
    pub fn on_parameter_set(&self, sps: &[u8], pps: &[u8]) {
        self.packetizer
            .set_parameter_set(ParameterSet::copy_from(sps, pps));
    }

    /// Encoder callback for one encoded access unit
    pub fn on_frame(&self, payload: &[u8], pts: Duration) -> usize {
        self.packetizer.submit(Frame::copy_from(payload, pts))
    }

    pub fn set_parameter_set(&self, parameter_set: ParameterSet) {
        self.packetizer.set_parameter_set(parameter_set);
    }

    pub fn submit(&self, frame: Frame) -> usize {
        self.packetizer.submit(frame)
    }

    pub fn ssrc(&self) -> u32 {
        self.packetizer.ssrc()
    }

    pub fn stats(&self) -> &PacketizerStats {
        self.packetizer.stats()
    }

    /// Packets waiting for the dispatch thread
    pub fn queued(&self) -> usize {
        self.packetizer.sink().len()
    }
}

/// Owner of a running stream
pub struct StreamSession {
    endpoint: MulticastEndpoint,
    dispatch: DispatchThread,
    handle: StreamHandle,
}

impl StreamSession {
    /// Open the sending channel and start dispatching.
    ///
    /// The MTU is checked and the channel opened here, on the caller's thread,
    /// so setup errors are returned directly. When the dispatch thread ends,
    /// for whatever reason, `events` receives [`SessionEvent::StreamStopped`], preceded by an
    /// error if a send failed.
    pub fn start(
        endpoint: MulticastEndpoint,
        provider: &dyn LocalAddressProvider,
        options: &ChannelOptions,
        config: &StreamConfig,
        events: EventSender,
    ) -> Result<Self, StreamError> {
        payloader_for(config)?;
        let channel = MulticastChannel::open(endpoint, ChannelRole::Send, provider, options)?;
        let local = channel.local_interface().clone();

        let on_exit: ExitHook = Box::new(move |failure| {
            if let Some(e) = failure {
                emit(&events, SessionEvent::Error(e.to_string()));
            }
            emit(&events, SessionEvent::StreamStopped);
        });

        let (dispatch, queue) =
            DispatchThread::spawn(channel, config.dispatch_poll(), Some(on_exit))
                .map_err(StreamError::Spawn)?;

        let packetizer = Arc::new(RtpPacketizer::new(config, queue)?);
        tracing::info!(
            "Streaming to {} via {} (ssrc {:08x}, pt {})",
            endpoint,
            local,
            packetizer.ssrc(),
            config.payload_type
        );

        Ok(Self {
            endpoint,
            dispatch,
            handle: StreamHandle { packetizer },
        })
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    pub fn endpoint(&self) -> MulticastEndpoint {
        self.endpoint
    }

    /// False once stopped or once a send failure ended the dispatch thread
    pub fn is_running(&self) -> bool {
        self.dispatch.is_running()
    }

    pub fn dispatch_stats(&self) -> &DispatchStats {
        self.dispatch.stats()
    }

    /// Stop dispatching and close the channel. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.dispatch.is_running() {
            tracing::info!("Stopping stream to {}", self.endpoint);
        }
        self.dispatch.stop_gracefully();
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::event::event_channel;
    use crate::network::interface::{FixedAddress, LocalInterface};
    use std::net::Ipv4Addr;

    struct NoInterface;

    impl LocalAddressProvider for NoInterface {
        fn resolve(&self) -> Result<LocalInterface, ChannelError> {
            Err(ChannelError::Interface("no multicast interface".into()))
        }
    }

    fn endpoint(port: u16) -> MulticastEndpoint {
        MulticastEndpoint::new(Ipv4Addr::new(239, 255, 42, 42), port).unwrap()
    }

    #[test]
    fn test_start_reports_channel_error_synchronously() {
        let (events, rx) = event_channel();
        let result = StreamSession::start(
            endpoint(46010),
            &NoInterface,
            &ChannelOptions::default(),
            &StreamConfig::default(),
            events,
        );

        match result {
            Err(StreamError::Open(ChannelError::Interface(_))) => {}
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("stream started without an interface"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tiny_mtu_fails_before_opening() {
        let (events, rx) = event_channel();
        let config = StreamConfig {
            mtu: 14,
            ..StreamConfig::default()
        };
        let result = StreamSession::start(
            endpoint(46012),
            &FixedAddress(Ipv4Addr::LOCALHOST),
            &ChannelOptions::default(),
            &config,
            events,
        );

        assert!(matches!(result, Err(StreamError::Mtu { mtu: 14, .. })));
        // No dispatch thread was started, so nothing reports a stop
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_emits_stream_stopped_once() {
        let (events, rx) = event_channel();
        // Multicast may be unavailable in a sandbox
        let Ok(mut session) = StreamSession::start(
            endpoint(46011),
            &FixedAddress(Ipv4Addr::LOCALHOST),
            &ChannelOptions::default(),
            &StreamConfig::default(),
            events,
        ) else {
            return;
        };

        let handle = session.handle();
        handle.on_parameter_set(&[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F], &[0x68, 0xCE]);
        let produced = handle.on_frame(&[0, 0, 0, 1, 0x65, 0x88, 0x84], Duration::ZERO);
        assert_eq!(produced, 2);

        session.stop();
        session.stop();
        assert!(!session.is_running());

        let stopped: Vec<_> = rx
            .try_iter()
            .filter(|event| *event == SessionEvent::StreamStopped)
            .collect();
        assert_eq!(stopped.len(), 1);

        // Packetized but refused once dispatch is gone
        handle.on_frame(&[0, 0, 0, 1, 0x41, 0x9A], Duration::from_millis(33));
        assert!(handle.stats().packets_refused.load(std::sync::atomic::Ordering::Relaxed) >= 1);
    }
}
