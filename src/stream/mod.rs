//! RTP streaming to a multicast group
//!
//! - `dispatch`: FIFO queue drained by a dedicated sending thread
//! - `session`: wires a packetizer, a dispatch thread and a channel together

pub mod dispatch;
pub mod session;

pub use dispatch::{DispatchQueue, DispatchStats, DispatchThread};
pub use session::{StreamHandle, StreamSession};
