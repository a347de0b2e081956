//! Transfer orchestrator.
//!
//! Binds a TCP listener and hands each accepted connection to a fresh
//! [`ReceiverSession`](synergy_data_channel::ReceiverSession). Connections
//! are served one at a time; later peers wait in the OS backlog until the
//! current transfer finishes.

mod config;
mod server;

pub use config::{ServerConfig, default_receive_dir};
pub use server::{ServerStatus, TransferEvent, TransferServer};

/// Capacity of the event channel handed out by
/// [`TransferServer::subscribe`].
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors produced by the transfer server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server already running")]
    AlreadyRunning,

    #[error("server not running")]
    NotRunning,
}
