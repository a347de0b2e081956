//! Framed data channel and the chunked file-transfer exchange.
//!
//! Any `AsyncRead + AsyncWrite + Unpin` byte stream can carry a transfer:
//! TCP sockets in production, `tokio::io::duplex` pipes in tests.
//!
//! # Exchange
//!
//! ```text
//! sender                               receiver
//!   FRAME(TransferHandshake)    ->
//!                               <-     FRAME(ReadyResponse)
//!   FRAME(ChunkHeader) + raw    ->
//!                               <-     FRAME(ChunkAck)
//!   ... one chunk in flight at a time ...
//!                               <-     FRAME(TransferResult)
//! ```
//!
//! See [`wire`] for the frame layout.

pub mod error;
mod guard;
pub mod receiver;
pub mod sender;
pub mod state;
pub mod wire;

pub use error::DataChannelError;
pub use receiver::{ReceiverConfig, ReceiverSession};
pub use sender::SenderSession;
pub use state::TransferState;

use std::time::Duration;

/// How long a failing receiver waits to deliver its failure record.
pub const FAILURE_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[cfg(test)]
mod test_support;
