//! File-side building blocks of a Synergy transfer.
//!
//! Everything here is scoped to a single transfer attempt: a
//! [`ChecksumEngine`] and a [`ProgressTracker`] are created per transfer
//! and never shared.

mod checksum;
mod chunked;
pub mod format;
mod generator;
mod progress;
mod validation;

pub use checksum::{
    ChecksumEngine, EMPTY_SHA256, calculate_file_checksum, checksum_bytes, checksums_match,
    verify_file_checksum,
};
pub use chunked::{ChunkReader, FileChunk, PartialFile};
pub use generator::{
    FileInfo, FillPattern, GENERATOR_BLOCK_SIZE, GeneratedFile, GenerationProgress, SizePreset,
    create_test_file, file_info, generate_file,
};
pub use progress::{
    ProgressSender, ProgressSnapshot, ProgressTracker, average_speed_mbps, transfer_time_ms,
};
pub use validation::{resolve_receive_path, sanitize_file_name};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),
}
