//! Multicast socket layer: channels, the listener loop and one-shot sends

pub mod channel;
pub mod endpoint;
pub mod format;
pub mod interface;
pub mod listener;
pub mod sender;

pub use channel::{ChannelOptions, ChannelRole, DatagramSink, DatagramSource, MulticastChannel};
pub use endpoint::MulticastEndpoint;
pub use interface::{FixedAddress, LocalAddressProvider, LocalInterface, SystemInterface};
pub use listener::MulticastListener;
pub use sender::{send_message, spawn_send};
