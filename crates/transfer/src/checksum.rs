use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::TransferError;

/// SHA-256 of the empty input.
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Computes SHA-256 of `data` and returns the lowercase hex digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compares two hex digests, ignoring case.
pub fn checksums_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Computes SHA-256 of an entire file, streaming it from disk.
pub async fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Returns `true` if the file's digest matches `expected` (case-insensitive).
pub async fn verify_file_checksum(path: &Path, expected: &str) -> Result<bool, TransferError> {
    let actual = calculate_file_checksum(path).await?;
    Ok(checksums_match(&actual, expected))
}

// ---------------------------------------------------------------------------
// ChecksumEngine
// ---------------------------------------------------------------------------

/// Running SHA-256 state for one transfer.
///
/// Each chunk gets its own one-shot digest (chunks are acknowledged
/// individually), while every accepted chunk also feeds the incremental
/// whole-file digest.
pub struct ChecksumEngine {
    whole: Sha256,
    bytes: u64,
}

impl Default for ChecksumEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumEngine {
    pub fn new() -> Self {
        Self {
            whole: Sha256::new(),
            bytes: 0,
        }
    }

    /// Feeds `chunk` into the whole-file digest and returns its own digest.
    pub fn update(&mut self, chunk: &[u8]) -> String {
        self.whole.update(chunk);
        self.bytes += chunk.len() as u64;
        checksum_bytes(chunk)
    }

    /// Verifies `chunk` against `expected` before accepting it.
    ///
    /// The whole-file digest is only fed when the chunk matches.
    pub fn verify_chunk(&mut self, chunk: &[u8], expected: &str) -> Result<String, TransferError> {
        let actual = checksum_bytes(chunk);
        if !checksums_match(&actual, expected) {
            return Err(TransferError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        self.whole.update(chunk);
        self.bytes += chunk.len() as u64;
        Ok(actual)
    }

    /// Total bytes fed into the whole-file digest.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Consumes the engine and returns the lowercase hex whole-file digest.
    pub fn finalize(self) -> String {
        hex::encode(self.whole.finalize())
    }
}
