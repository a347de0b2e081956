use serde::{Deserialize, Serialize};

use crate::constants::{PROTOCOL_VERSION, STATUS_READY};

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Metadata for the single file carried by a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Bare file name declared by the sender.
    pub name: String,
    /// Total file size in bytes.
    pub size: u64,
    /// SHA-256 hex digest of the whole file.
    pub checksum: String,
    /// Maximum chunk size the sender will use.
    pub chunk_size: u64,
}

/// First message of every transfer, sent by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHandshake {
    pub protocol_version: String,
    pub file_metadata: FileMetadata,
    pub transfer_id: String,
}

impl TransferHandshake {
    /// Creates a handshake for the current protocol version.
    pub fn new(file_metadata: FileMetadata, transfer_id: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.into(),
            file_metadata,
            transfer_id: transfer_id.into(),
        }
    }

    /// Returns `true` if the major version matches ours.
    pub fn is_compatible(&self) -> bool {
        major(&self.protocol_version) == major(PROTOCOL_VERSION)
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or("")
}

/// Generates a transfer identifier: `transfer_<unix seconds>_<8 hex>`.
pub fn new_transfer_id() -> String {
    let secs = chrono::Utc::now().timestamp();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("transfer_{secs}_{}", &suffix[..8])
}

/// Receiver reply to a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default)]
    pub transfer_id: String,
}

impl ReadyResponse {
    /// Creates a positive reply for `transfer_id`.
    pub fn ready(transfer_id: impl Into<String>) -> Self {
        Self {
            status: STATUS_READY.into(),
            message: "Ready to receive file".into(),
            transfer_id: transfer_id.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == STATUS_READY
    }
}

/// Anything the receiver may answer to a handshake.
///
/// A receiver that refuses the transfer replies with a failure record
/// instead of a [`ReadyResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandshakeReply {
    Ready(ReadyResponse),
    Rejected(TransferFailure),
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// Framed header preceding each raw chunk payload.
///
/// Exactly `chunk_size` raw bytes follow the header on the stream with no
/// additional framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// 1-based, strictly increasing, no gaps.
    pub chunk_id: u64,
    pub chunk_size: u64,
    pub chunk_checksum: String,
    pub is_last_chunk: bool,
}

/// Outcome reported in a [`ChunkAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Received,
    Error,
}

/// Receiver acknowledgement of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAck {
    pub chunk_id: u64,
    pub status: AckStatus,
    #[serde(default)]
    pub message: String,
}

impl ChunkAck {
    /// Acknowledges a chunk that was written and verified.
    pub fn received(chunk_id: u64) -> Self {
        Self {
            chunk_id,
            status: AckStatus::Received,
            message: "Chunk received successfully".into(),
        }
    }
}

/// Anything the receiver may answer to a chunk: an ack, or a failure
/// record when it aborts the transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkReply {
    Ack(ChunkAck),
    Rejected(TransferFailure),
}

// ---------------------------------------------------------------------------
// Final result
// ---------------------------------------------------------------------------

/// Statistics of a transfer that reached its end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub transfer_complete: bool,
    /// Only reported by the sending side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u64>,
    pub total_bytes: u64,
    pub transfer_time_ms: u64,
    pub average_speed_mbps: f64,
    pub file_checksum: String,
    pub checksum_verified: bool,
    /// Only reported by the receiving side.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_path: String,
}

/// Terminal record of an aborted transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferFailure {
    pub transfer_complete: bool,
    /// Machine-checkable failure kind.
    pub error: String,
    /// Human-oriented detail.
    pub message: String,
    /// Set when the failure is a whole-file verification mismatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

/// Final record of a transfer, produced once by whichever side finished it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransferResult {
    Success(TransferSummary),
    Failure(TransferFailure),
}

impl TransferResult {
    /// Creates a failure record.
    pub fn failure(error: impl Into<String>, message: impl Into<String>) -> Self {
        TransferResult::Failure(TransferFailure {
            transfer_complete: false,
            error: error.into(),
            message: message.into(),
            checksum_verified: None,
            file_checksum: None,
            total_bytes: None,
        })
    }

    /// Returns `true` only for a completed transfer.
    pub fn is_complete(&self) -> bool {
        match self {
            TransferResult::Success(s) => s.transfer_complete,
            TransferResult::Failure(_) => false,
        }
    }

    /// Returns `true` if the whole-file checksum was verified.
    pub fn checksum_verified(&self) -> bool {
        match self {
            TransferResult::Success(s) => s.checksum_verified,
            TransferResult::Failure(f) => f.checksum_verified.unwrap_or(false),
        }
    }

    /// Returns the failure kind, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            TransferResult::Success(_) => None,
            TransferResult::Failure(f) => Some(&f.error),
        }
    }

    /// Returns the transferred byte count when known.
    pub fn total_bytes(&self) -> Option<u64> {
        match self {
            TransferResult::Success(s) => Some(s.total_bytes),
            TransferResult::Failure(f) => f.total_bytes,
        }
    }

    pub fn as_summary(&self) -> Option<&TransferSummary> {
        match self {
            TransferResult::Success(s) => Some(s),
            TransferResult::Failure(_) => None,
        }
    }
}
