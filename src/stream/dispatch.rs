//! Dispatch queue and thread
//!
//! The packetizer's caller pushes onto an unbounded channel; a dedicated
//! thread pops in FIFO order and performs the blocking socket writes. The
//! thread blocks on the channel with a timeout instead of polling, and the
//! timeout doubles as the stop-flag checkpoint.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::StreamError;
use crate::network::channel::DatagramSink;
use crate::rtp::packet::RtpPacket;
use crate::rtp::packetizer::PacketSink;

/// Called once on the dispatch thread right before it exits, with the send
/// failure that ended it, if any
pub type ExitHook = Box<dyn FnOnce(Option<StreamError>) + Send>;

/// Producer side of the dispatch queue. Cheap to clone.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: Sender<RtpPacket>,
    refused: Arc<AtomicU64>,
}

impl DispatchQueue {
    /// Append a packet. Never blocks; refuses only once the dispatch thread
    /// has shut down.
    pub fn enqueue(&self, packet: RtpPacket) -> bool {
        match self.tx.send(packet) {
            Ok(()) => true,
            Err(_) => {
                self.refused.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Packets waiting to be sent
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Packets refused after shutdown
    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }
}

impl PacketSink for DispatchQueue {
    fn enqueue(&self, packet: RtpPacket) -> bool {
        DispatchQueue::enqueue(self, packet)
    }
}

/// Dispatch counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_errors: AtomicU64,
    pub packets_discarded: AtomicU64,
}

/// Owns the thread draining a [`DispatchQueue`] onto a datagram sink
pub struct DispatchThread {
    running: Arc<AtomicBool>,
    stats: Arc<DispatchStats>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DispatchThread {
    /// Start draining onto `sink`. The sink is closed by the thread on exit.
    pub fn spawn<T>(
        sink: T,
        poll_interval: Duration,
        on_exit: Option<ExitHook>,
    ) -> io::Result<(Self, DispatchQueue)>
    where
        T: DatagramSink + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(DispatchStats::default());

        let running_for_loop = running.clone();
        let stats_for_loop = stats.clone();

        let handle = thread::Builder::new()
            .name("multicast-dispatch".into())
            .spawn(move || {
                let failure =
                    run_dispatch(sink, rx, &running_for_loop, poll_interval, &stats_for_loop);
                running_for_loop.store(false, Ordering::SeqCst);
                if let Some(hook) = on_exit {
                    hook(failure);
                }
            })?;

        let queue = DispatchQueue {
            tx,
            refused: Arc::new(AtomicU64::new(0)),
        };

        Ok((
            Self {
                running,
                stats,
                thread_handle: Some(handle),
            },
            queue,
        ))
    }

    /// Stop after the in-flight send, discard whatever is still queued, close
    /// the sink and join the thread. Safe to call repeatedly.
    pub fn stop_gracefully(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Dispatch thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

impl Drop for DispatchThread {
    fn drop(&mut self) {
        self.stop_gracefully();
    }
}

fn run_dispatch<T: DatagramSink>(
    mut sink: T,
    rx: Receiver<RtpPacket>,
    running: &AtomicBool,
    poll_interval: Duration,
    stats: &DispatchStats,
) -> Option<StreamError> {
    tracing::debug!("Dispatch thread started");
    let mut failure = None;

    while running.load(Ordering::Relaxed) {
        let packet = match rx.recv_timeout(poll_interval) {
            Ok(packet) => packet,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match sink.send_datagram(&packet) {
            Ok(sent) => {
                stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                stats.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
            }
            Err(e) => {
                stats.send_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!("RTP send failed, stopping dispatch: {}", e);
                failure = Some(StreamError::Dispatch(e));
                break;
            }
        }
    }

    let discarded = rx.try_iter().count() as u64;
    stats.packets_discarded.fetch_add(discarded, Ordering::Relaxed);
    drop(rx);
    sink.close();

    tracing::debug!(
        "Dispatch thread exiting ({} sent, {} discarded)",
        stats.packets_sent.load(Ordering::Relaxed),
        discarded
    );
    failure
}
