//! UI-facing session
//!
//! Owns at most one listener and one stream at a time and reports everything
//! that happens through a single [`SessionEvent`] channel. Every operation
//! returns immediately; failures arrive as [`SessionEvent::Error`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::AppConfig;
use crate::event::{emit, event_channel, EventReceiver, EventSender, SessionEvent};
use crate::network::channel::{ChannelOptions, ChannelRole, MulticastChannel};
use crate::network::endpoint::MulticastEndpoint;
use crate::network::interface::{FixedAddress, LocalAddressProvider, SystemInterface};
use crate::network::listener::MulticastListener;
use crate::network::sender::spawn_send;
use crate::stream::session::{StreamHandle, StreamSession};

pub struct Session {
    config: AppConfig,
    options: ChannelOptions,
    provider: Arc<dyn LocalAddressProvider>,
    hex_display: Arc<AtomicBool>,
    listener: Option<MulticastListener>,
    stream: Option<StreamSession>,
    senders: Vec<JoinHandle<()>>,
    events: EventSender,
}

impl Session {
    pub fn new(config: AppConfig, provider: Arc<dyn LocalAddressProvider>) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let options = ChannelOptions::from(&config.network);
        let hex_display = Arc::new(AtomicBool::new(config.console.hex_display));

        let session = Self {
            config,
            options,
            provider,
            hex_display,
            listener: None,
            stream: None,
            senders: Vec::new(),
            events,
        };
        (session, receiver)
    }

    /// Session whose local address comes from the network config: a pinned
    /// address if set, else the named or primary interface
    pub fn from_config(config: AppConfig) -> (Self, EventReceiver) {
        let provider: Arc<dyn LocalAddressProvider> = match config.network.local_address {
            Some(address) => Arc::new(FixedAddress(address)),
            None => Arc::new(SystemInterface::new(config.network.interface.clone())),
        };
        Self::new(config, provider)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Join `endpoint` and start printing what arrives.
    ///
    /// Any previous listener is stopped first. Returns false, after emitting
    /// an error event, if the channel could not be opened.
    pub fn start_listening(&mut self, endpoint: MulticastEndpoint) -> bool {
        self.stop_listening();

        let channel = match MulticastChannel::open(
            endpoint,
            ChannelRole::Listen,
            self.provider.as_ref(),
            &self.options,
        ) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Cannot listen on {}: {}", endpoint, e);
                emit(&self.events, SessionEvent::Error(e.to_string()));
                return false;
            }
        };

        match MulticastListener::start(channel, self.hex_display.clone(), self.events.clone()) {
            Ok(listener) => {
                tracing::info!("Listening on {}", endpoint);
                self.listener = Some(listener);
                true
            }
            Err(e) => {
                tracing::error!("Failed to spawn listener thread: {}", e);
                emit(&self.events, SessionEvent::Error(e.to_string()));
                false
            }
        }
    }

    /// Stop the listener and wait for it. Does nothing when not listening.
    pub fn stop_listening(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }
    }

    /// Send `text` as one datagram on a short-lived channel
    pub fn send(&mut self, endpoint: MulticastEndpoint, text: impl Into<String>) {
        self.senders.retain(|handle| !handle.is_finished());

        match spawn_send(
            endpoint,
            text.into(),
            self.provider.clone(),
            self.options.clone(),
            self.events.clone(),
        ) {
            Ok(handle) => self.senders.push(handle),
            Err(e) => {
                tracing::error!("Failed to spawn sender thread: {}", e);
                emit(&self.events, SessionEvent::Error(e.to_string()));
            }
        }
    }

    /// Block until every send started so far has finished
    pub fn wait_for_sends(&mut self) {
        for handle in self.senders.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Sender thread panicked");
            }
        }
    }

    /// Takes effect from the next received datagram
    pub fn set_hex_display(&self, enabled: bool) {
        self.hex_display.store(enabled, Ordering::Relaxed);
    }

    pub fn hex_display(&self) -> bool {
        self.hex_display.load(Ordering::Relaxed)
    }

    /// Start streaming RTP to `endpoint`.
    ///
    /// Returns the handle a video source pushes parameter sets and frames
    /// into, or `None` after emitting an error event. If a stream is already
    /// running its handle is returned and `endpoint` is ignored.
    pub fn start_streaming(&mut self, endpoint: MulticastEndpoint) -> Option<StreamHandle> {
        if let Some(stream) = self.stream.as_ref().filter(|s| s.is_running()) {
            tracing::debug!("Already streaming to {}", stream.endpoint());
            return Some(stream.handle());
        }
        self.stream = None;

        match StreamSession::start(
            endpoint,
            self.provider.as_ref(),
            &self.options,
            &self.config.stream,
            self.events.clone(),
        ) {
            Ok(stream) => {
                let handle = stream.handle();
                self.stream = Some(stream);
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("Cannot stream to {}: {}", endpoint, e);
                emit(&self.events, SessionEvent::Error(e.to_string()));
                None
            }
        }
    }

    /// Stop streaming. Outstanding handles keep working but every packet
    /// they produce is refused.
    pub fn stop_streaming(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }

    /// The multicast-capable link went away: tear everything down
    pub fn connectivity_lost(&mut self) {
        tracing::warn!("Connectivity lost, stopping listener and stream");
        self.stop_listening();
        self.stop_streaming();
        emit(&self.events, SessionEvent::ConnectivityLost);
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| l.is_running())
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_running())
    }

    pub fn stream_handle(&self) -> Option<StreamHandle> {
        self.stream.as_ref().map(|s| s.handle())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_listening();
        self.stop_streaming();
        self.wait_for_sends();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::network::interface::LocalInterface;
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    struct NoInterface;

    impl LocalAddressProvider for NoInterface {
        fn resolve(&self) -> Result<LocalInterface, ChannelError> {
            Err(ChannelError::Interface("no multicast interface".into()))
        }
    }

    fn endpoint(port: u16) -> MulticastEndpoint {
        MulticastEndpoint::new(Ipv4Addr::new(239, 255, 43, 43), port).unwrap()
    }

    fn next_event(rx: &EventReceiver, timeout: Duration) -> Option<SessionEvent> {
        rx.recv_timeout(timeout).ok()
    }

    /// Wait for the first `Line`, skipping unrelated events
    fn next_line(rx: &EventReceiver, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match next_event(rx, left)? {
                SessionEvent::Line(line) => return Some(line),
                _ => continue,
            }
        }
        None
    }

    #[test]
    fn test_stop_listening_when_idle_is_silent() {
        let (mut session, rx) = Session::new(AppConfig::default(), Arc::new(NoInterface));
        session.stop_listening();
        session.stop_listening();
        assert!(!session.is_listening());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_listen_failure_is_reported() {
        let (mut session, rx) = Session::new(AppConfig::default(), Arc::new(NoInterface));
        assert!(!session.start_listening(endpoint(46020)));
        assert!(!session.is_listening());

        match rx.try_recv() {
            Ok(SessionEvent::Error(msg)) => assert!(msg.contains("no multicast interface")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_stream_failure_is_reported() {
        let (mut session, rx) = Session::new(AppConfig::default(), Arc::new(NoInterface));
        assert!(session.start_streaming(endpoint(46021)).is_none());
        assert!(!session.is_streaming());
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Error(_))));

        // Nothing to stop
        session.stop_streaming();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tiny_mtu_is_reported_without_stopping() {
        let mut config = AppConfig::default();
        config.stream.mtu = 14;
        let (mut session, rx) = Session::new(config, Arc::new(FixedAddress(Ipv4Addr::LOCALHOST)));

        assert!(session.start_streaming(endpoint(46023)).is_none());
        assert!(!session.is_streaming());
        match rx.try_recv() {
            Ok(SessionEvent::Error(msg)) => assert!(msg.contains("MTU of 14 bytes"), "{}", msg),
            other => panic!("unexpected event: {:?}", other),
        }
        // The stream never started, so there is no stop to report
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_failure_is_reported() {
        let (mut session, rx) = Session::new(AppConfig::default(), Arc::new(NoInterface));
        session.send(endpoint(46022), "hello");
        session.wait_for_sends();
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Error(_))));
    }

    #[test]
    fn test_connectivity_lost_is_reported() {
        let (mut session, rx) = Session::new(AppConfig::default(), Arc::new(NoInterface));
        session.connectivity_lost();
        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::ConnectivityLost));
    }

    #[test]
    fn test_hex_display_toggle() {
        let mut config = AppConfig::default();
        config.console.hex_display = true;
        let (session, _rx) = Session::new(config, Arc::new(NoInterface));
        assert!(session.hex_display());
        session.set_hex_display(false);
        assert!(!session.hex_display());
    }

    #[test]
    fn test_send_reaches_own_listener() {
        let (mut session, rx) =
            Session::new(AppConfig::default(), Arc::new(FixedAddress(Ipv4Addr::LOCALHOST)));
        let group = endpoint(46023);

        // Multicast may be unavailable in a sandbox
        if !session.start_listening(group) {
            return;
        }
        assert!(session.is_listening());

        session.send(group, "hello");
        session.wait_for_sends();
        if let Some(line) = next_line(&rx, Duration::from_secs(2)) {
            assert_eq!(line, "[You] hello\n");
        }

        session.set_hex_display(true);
        session.send(group, "hello");
        session.wait_for_sends();
        if let Some(line) = next_line(&rx, Duration::from_secs(2)) {
            assert_eq!(line, "[You] 0x68 0x65 0x6C 0x6C 0x6F \n");
        }

        session.stop_listening();
        assert!(!session.is_listening());
        let stopped = rx
            .try_iter()
            .filter(|event| *event == SessionEvent::ListenerStopped)
            .count();
        assert_eq!(stopped, 1);
    }

    #[test]
    fn test_start_streaming_twice_reuses_stream() {
        let (mut session, _rx) =
            Session::new(AppConfig::default(), Arc::new(FixedAddress(Ipv4Addr::LOCALHOST)));
        let Some(first) = session.start_streaming(endpoint(46024)) else {
            return;
        };
        let Some(second) = session.start_streaming(endpoint(46025)) else {
            return;
        };
        assert_eq!(first.ssrc(), second.ssrc());

        session.stop_streaming();
        assert!(!session.is_streaming());
        assert!(session.stream_handle().is_none());
    }
}
