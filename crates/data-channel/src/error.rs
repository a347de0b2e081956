//! Error types for the data channel.

use std::io::ErrorKind;

use synergy_protocol::TransferResult;
use synergy_transfer::TransferError;

/// Errors produced by the framer and the transfer sessions.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended or broke in the middle of a frame or chunk.
    #[error("framing error: {0}")]
    Framing(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("checksum mismatch for chunk {chunk_id}")]
    ChecksumMismatch { chunk_id: u64 },

    #[error("file checksum mismatch: expected {expected}, got {actual}")]
    FileChecksumMismatch { expected: String, actual: String },

    /// The peer refused the transfer.
    #[error("rejected by peer: {0}")]
    Rejected(String),

    #[error("invalid file path: {0}")]
    InvalidPath(String),

    #[error("chunk size {size} exceeds limit of {max} bytes")]
    ChunkTooLarge { size: u64, max: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("timed out waiting for peer")]
    Timeout,

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataChannelError {
    /// Machine-checkable failure kind carried in failure records.
    pub fn kind(&self) -> &'static str {
        if self.is_connection_lost() {
            return "connection_lost";
        }
        match self {
            Self::Io(_) => "io_error",
            Self::Framing(_) => "connection_lost",
            Self::Protocol(_) | Self::Json(_) => "protocol_violation",
            Self::ChecksumMismatch { .. } => "chunk_checksum_mismatch",
            Self::FileChecksumMismatch { .. } => "file_checksum_mismatch",
            Self::Rejected(_) => "rejected",
            Self::InvalidPath(_) => "invalid_path",
            Self::ChunkTooLarge { .. } => "chunk_too_large",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }

    /// Returns `true` if the peer went away.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Framing(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Terminal failure record describing this error.
    pub fn to_result(&self) -> TransferResult {
        TransferResult::failure(self.kind(), self.to_string())
    }
}

impl From<TransferError> for DataChannelError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io(e) => Self::Io(e),
            TransferError::InvalidPath(msg) => Self::InvalidPath(msg),
            TransferError::InvalidSize(msg) => Self::Protocol(msg),
            TransferError::ChecksumMismatch { expected, actual } => {
                Self::FileChecksumMismatch { expected, actual }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_loss_kinds() {
        let eof = DataChannelError::Io(std::io::Error::from(ErrorKind::UnexpectedEof));
        assert!(eof.is_connection_lost());
        assert_eq!(eof.kind(), "connection_lost");

        let reset = DataChannelError::Io(std::io::Error::from(ErrorKind::ConnectionReset));
        assert_eq!(reset.kind(), "connection_lost");

        let denied = DataChannelError::Io(std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(!denied.is_connection_lost());
        assert_eq!(denied.kind(), "io_error");

        assert_eq!(
            DataChannelError::Framing("eof".into()).kind(),
            "connection_lost"
        );
    }

    #[test]
    fn to_result_is_failure_record() {
        let result = DataChannelError::ChecksumMismatch { chunk_id: 3 }.to_result();
        assert!(!result.is_complete());
        assert_eq!(result.error(), Some("chunk_checksum_mismatch"));
    }
}
