//! Wire protocol types for Synergy peer-to-peer communication.
//!
//! Two message families share the same length-prefixed JSON framing:
//!
//! - [`messages`]: the chunked file-transfer exchange (handshake, chunk
//!   headers, acks, final result).
//! - [`control`]: small command/notification messages exchanged over the
//!   control channel.

pub mod constants;
pub mod control;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_TCP_PORT, FILE_CHUNK_SIZE, PROTOCOL_VERSION};
pub use control::{ActionType, ColorType, ControlMessage, ErrorCode, MessageType};
pub use messages::{
    AckStatus, ChunkAck, ChunkHeader, ChunkReply, FileMetadata, HandshakeReply, ReadyResponse,
    TransferFailure, TransferHandshake, TransferResult, TransferSummary, new_transfer_id,
};
