//! Messages from the core back to the UI

use crossbeam_channel::{Receiver, Sender};

/// Everything the UI is told about, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// One formatted console line, newline included
    Line(String),

    /// A failure that ended an operation
    Error(String),

    /// The listener thread exited and its channel is closed
    ListenerStopped,

    /// The dispatch thread exited and the streaming channel is closed
    StreamStopped,

    /// The platform reported loss of the multicast-capable link
    ConnectivityLost,
}

pub type EventSender = Sender<SessionEvent>;
pub type EventReceiver = Receiver<SessionEvent>;

/// Unbounded so reporting never blocks a network thread
pub fn event_channel() -> (EventSender, EventReceiver) {
    crossbeam_channel::unbounded()
}

/// Deliver an event, ignoring a UI that has gone away
pub(crate) fn emit(events: &EventSender, event: SessionEvent) {
    if events.send(event).is_err() {
        tracing::trace!("Event receiver dropped");
    }
}
