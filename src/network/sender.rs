//! One-shot message sender
//!
//! Every send opens its own short-lived channel, so it never touches a
//! listener's socket and can run while listening is active.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::SendError;
use crate::event::{emit, EventSender, SessionEvent};
use crate::network::channel::{ChannelOptions, ChannelRole, DatagramSink, MulticastChannel};
use crate::network::endpoint::MulticastEndpoint;
use crate::network::interface::LocalAddressProvider;

/// Send `message` as a single datagram to the group.
///
/// Returns the number of bytes written. The channel is closed on every path.
pub fn send_message(
    endpoint: MulticastEndpoint,
    message: &str,
    provider: &dyn LocalAddressProvider,
    options: &ChannelOptions,
) -> Result<usize, SendError> {
    let mut channel = MulticastChannel::open(endpoint, ChannelRole::Send, provider, options)?;
    let result = transmit(&mut channel, message.as_bytes());
    channel.close();
    result
}

/// Write one datagram and check it went out whole
pub fn transmit<T: DatagramSink + ?Sized>(sink: &mut T, payload: &[u8]) -> Result<usize, SendError> {
    let sent = sink.send_datagram(payload).map_err(SendError::Transmit)?;
    if sent != payload.len() {
        return Err(SendError::Truncated {
            sent,
            expected: payload.len(),
        });
    }
    Ok(sent)
}

/// Run [`send_message`] on its own thread, reporting failure as an event
pub fn spawn_send(
    endpoint: MulticastEndpoint,
    message: String,
    provider: Arc<dyn LocalAddressProvider>,
    options: ChannelOptions,
    events: EventSender,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("multicast-sender".into())
        .spawn(move || match send_message(endpoint, &message, provider.as_ref(), &options) {
            Ok(sent) => tracing::info!("Sent {} bytes to {}", sent, endpoint),
            Err(e) => {
                tracing::warn!("Send to {} failed: {}", endpoint, e);
                emit(&events, SessionEvent::Error(e.to_string()));
            }
        })
}
