//! Listener loop
//!
//! Receives datagrams on a dedicated thread and turns each one into a console
//! line. The receive timeout bounds how long a stop request can go unnoticed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::constants::MAX_DATAGRAM_SIZE;
use crate::event::{emit, EventSender, SessionEvent};
use crate::network::channel::{is_timeout, DatagramSource};
use crate::network::format::format_datagram;

/// Listener counters
#[derive(Debug, Default)]
pub struct ListenerStats {
    pub datagrams_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub receive_errors: AtomicU64,
}

/// Handle to a running listener thread
pub struct MulticastListener {
    running: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MulticastListener {
    /// Spawn the loop on an already opened source.
    ///
    /// `hex_display` is read per datagram, so toggling it takes effect on
    /// the next packet.
    pub fn start<S>(
        source: S,
        hex_display: Arc<AtomicBool>,
        events: EventSender,
    ) -> std::io::Result<Self>
    where
        S: DatagramSource + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ListenerStats::default());

        let running_for_loop = running.clone();
        let stats_for_loop = stats.clone();

        let handle = thread::Builder::new()
            .name("multicast-listener".into())
            .spawn(move || {
                run_listener(source, &running_for_loop, &hex_display, &stats_for_loop, &events);
            })?;

        Ok(Self {
            running,
            stats,
            thread_handle: Some(handle),
        })
    }

    /// Ask the loop to exit and wait for it. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Listener thread panicked");
            }
        }
    }

    /// False once stopped or once the thread has exited on its own
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .thread_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }
}

impl Drop for MulticastListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_listener<S: DatagramSource>(
    mut source: S,
    running: &AtomicBool,
    hex_display: &AtomicBool,
    stats: &ListenerStats,
    events: &EventSender,
) {
    let local = source.local_address();
    tracing::info!("Listening (local address {})", local);

    while running.load(Ordering::Relaxed) {
        // Fresh buffer per datagram; the formatted line is handed off to
        // another thread
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let (len, from) = match source.recv_datagram(&mut buf) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Transient receive error: {}", e);
                continue;
            }
        };

        stats.datagrams_received.fetch_add(1, Ordering::Relaxed);
        stats.bytes_received.fetch_add(len as u64, Ordering::Relaxed);

        let hex = hex_display.load(Ordering::Relaxed);
        let line = format_datagram(&buf[..len], from.ip(), local, hex);
        tracing::trace!("Received {} bytes from {}", len, from);

        emit(events, SessionEvent::Line(line));
    }

    source.close();
    tracing::info!("Listener stopped");
    emit(events, SessionEvent::ListenerStopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;
    use std::collections::VecDeque;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
    const REMOTE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 9);

    /// Replays scripted results, then times out forever
    struct ScriptedSource {
        script: VecDeque<io::Result<(Vec<u8>, IpAddr)>>,
        closed: Arc<AtomicBool>,
    }

    impl DatagramSource for ScriptedSource {
        fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            match self.script.pop_front() {
                Some(Ok((data, ip))) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok((data.len(), SocketAddr::new(ip, 5000)))
                }
                Some(Err(e)) => Err(e),
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Err(io::Error::from(io::ErrorKind::WouldBlock))
                }
            }
        }

        fn local_address(&self) -> Ipv4Addr {
            LOCAL
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn collect_lines(rx: &crate::event::EventReceiver, n: usize) -> Vec<String> {
        let mut lines = Vec::new();
        while lines.len() < n {
            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(SessionEvent::Line(l)) => lines.push(l),
                Ok(other) => panic!("unexpected event {:?}", other),
                Err(_) => break,
            }
        }
        lines
    }

    #[test]
    fn test_lines_in_arrival_order() {
        let closed = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource {
            script: VecDeque::from(vec![
                Ok((b"first".to_vec(), IpAddr::V4(LOCAL))),
                Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
                Err(io::Error::from(io::ErrorKind::TimedOut)),
                Ok((b"second".to_vec(), IpAddr::V4(REMOTE))),
            ]),
            closed: closed.clone(),
        };
        let (tx, rx) = event_channel();

        let mut listener =
            MulticastListener::start(source, Arc::new(AtomicBool::new(false)), tx).unwrap();
        let lines = collect_lines(&rx, 2);
        assert_eq!(lines, vec!["[You] first\n", "[10.0.0.9] second\n"]);
        assert!(listener.is_running());

        listener.stop();
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(listener.stats().datagrams_received.load(Ordering::Relaxed), 2);
        assert_eq!(listener.stats().receive_errors.load(Ordering::Relaxed), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(SessionEvent::ListenerStopped));
    }

    #[test]
    fn test_hex_mode() {
        let source = ScriptedSource {
            script: VecDeque::from(vec![Ok((b"hello".to_vec(), IpAddr::V4(LOCAL)))]),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let (tx, rx) = event_channel();

        let _listener =
            MulticastListener::start(source, Arc::new(AtomicBool::new(true)), tx).unwrap();
        assert_eq!(collect_lines(&rx, 1), vec!["[You] 0x68 0x65 0x6C 0x6C 0x6F \n"]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let source = ScriptedSource {
            script: VecDeque::new(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let (tx, rx) = event_channel();

        let mut listener =
            MulticastListener::start(source, Arc::new(AtomicBool::new(false)), tx).unwrap();
        listener.stop();
        listener.stop();
        assert!(!listener.is_running());

        assert_eq!(rx.try_recv(), Ok(SessionEvent::ListenerStopped));
        assert!(rx.try_recv().is_err());
    }
}
