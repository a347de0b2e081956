//! Control channel between two peers.
//!
//! Small [`ControlMessage`](synergy_protocol::ControlMessage)s travel over
//! the same length-prefixed JSON framing as file transfers. Each
//! connection runs a listener pump (inbound frames to a queue) and a
//! sender pump (outbound queue to frames), so reads never wait on writes.

mod connection;
mod error;
mod pumps;

pub use connection::{ControlConnection, QueueSizes};
pub use error::ControlError;

/// Capacity of the inbound and outbound message queues.
pub const CONTROL_QUEUE_CAPACITY: usize = 256;
