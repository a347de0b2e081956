//! Sending side of a transfer.

use std::path::Path;
use std::time::{Duration, Instant};

use synergy_protocol::constants::PROGRESS_UPDATE_INTERVAL;
use synergy_protocol::{
    AckStatus, ChunkHeader, ChunkReply, FILE_CHUNK_SIZE, FileMetadata, HandshakeReply,
    TransferHandshake, TransferResult, TransferSummary, new_transfer_id,
};
use synergy_transfer::{
    ChunkReader, ProgressSender, ProgressSnapshot, ProgressTracker, average_speed_mbps,
    calculate_file_checksum, checksums_match, transfer_time_ms,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DataChannelError;
use crate::guard::{guarded, guarded_write_all};
use crate::state::{TransferState, transition};
use crate::wire::{receive_json, send_json};

/// Streams one file to a receiver over `stream`.
///
/// A session is single-use: create a new one per transfer.
pub struct SenderSession<S> {
    stream: S,
    cancel: CancellationToken,
    chunk_size: usize,
    progress_interval: Duration,
    idle_timeout: Option<Duration>,
    progress_tx: Option<ProgressSender>,
    state: TransferState,
    transfer_id: String,
}

/// What the sender measured itself, merged into the receiver's result.
#[derive(Debug, Clone)]
struct SenderStats {
    total_chunks: u64,
    total_bytes: u64,
    elapsed: Duration,
    checksum: String,
}

impl<S> SenderSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, cancel: CancellationToken) -> Self {
        Self {
            stream,
            cancel,
            chunk_size: FILE_CHUNK_SIZE,
            progress_interval: PROGRESS_UPDATE_INTERVAL,
            idle_timeout: None,
            progress_tx: None,
            state: TransferState::Idle,
            transfer_id: String::new(),
        }
    }

    /// Sets the chunk size announced in the handshake. Zero is ignored.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    pub fn with_progress(mut self, progress_tx: ProgressSender) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Fails the transfer if the peer stays silent for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Identifier announced in the handshake; empty before it is sent.
    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Sends `path` and returns the merged result.
    ///
    /// A local abort (I/O, protocol violation, rejected chunk, cancellation)
    /// is an `Err`. A transfer the receiver ran to the end but reported as
    /// failed is an `Ok` carrying a failure record.
    pub async fn send_file(&mut self, path: &Path) -> Result<TransferResult, DataChannelError> {
        if self.state != TransferState::Idle {
            return Err(DataChannelError::Protocol(format!(
                "sender session already used (state {})",
                self.state
            )));
        }

        match self.run(path).await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(transfer_id = %self.transfer_id, kind = err.kind(), "send failed: {err}");
                if !self.state.is_terminal() {
                    transition(&mut self.state, TransferState::Failed, &self.transfer_id);
                }
                Err(err)
            }
        }
    }

    async fn run(&mut self, path: &Path) -> Result<TransferResult, DataChannelError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DataChannelError::InvalidPath(format!("no usable file name in {}", path.display()))
            })?
            .to_string();
        let size = tokio::fs::metadata(path).await?.len();
        let checksum = calculate_file_checksum(path).await?;

        let handshake = TransferHandshake::new(
            FileMetadata {
                name,
                size,
                checksum: checksum.clone(),
                chunk_size: self.chunk_size as u64,
            },
            new_transfer_id(),
        );
        self.transfer_id = handshake.transfer_id.clone();
        info!(
            transfer_id = %self.transfer_id,
            file = %handshake.file_metadata.name,
            size,
            chunk_size = self.chunk_size,
            "starting transfer"
        );

        let started = Instant::now();
        guarded(
            &self.cancel,
            self.idle_timeout,
            send_json(&mut self.stream, &handshake),
        )
        .await?;
        transition(&mut self.state, TransferState::HandshakeSent, &self.transfer_id);

        let reply: HandshakeReply =
            guarded(&self.cancel, self.idle_timeout, receive_json(&mut self.stream)).await?;
        match reply {
            HandshakeReply::Ready(ready) if ready.is_ready() => {}
            HandshakeReply::Ready(ready) => {
                return Err(DataChannelError::Rejected(format!(
                    "receiver not ready (status {:?}): {}",
                    ready.status, ready.message
                )));
            }
            HandshakeReply::Rejected(failure) => {
                return Err(DataChannelError::Rejected(format!(
                    "{}: {}",
                    failure.error, failure.message
                )));
            }
        }
        transition(&mut self.state, TransferState::Transferring, &self.transfer_id);

        let mut reader = ChunkReader::open(path, self.chunk_size).await?;
        let mut tracker = ProgressTracker::new(size, self.progress_interval);

        while let Some(chunk) = reader.next_chunk().await? {
            if self.cancel.is_cancelled() {
                return Err(DataChannelError::Cancelled);
            }

            let header = ChunkHeader {
                chunk_id: chunk.chunk_id,
                chunk_size: chunk.data.len() as u64,
                chunk_checksum: chunk.checksum,
                is_last_chunk: chunk.is_last,
            };
            guarded(
                &self.cancel,
                self.idle_timeout,
                send_json(&mut self.stream, &header),
            )
            .await?;
            guarded_write_all(&mut self.stream, &chunk.data, &self.cancel, self.idle_timeout)
                .await?;

            let reply: ChunkReply =
                guarded(&self.cancel, self.idle_timeout, receive_json(&mut self.stream)).await?;
            check_ack(reply, header.chunk_id)?;
            debug!(
                transfer_id = %self.transfer_id,
                chunk_id = header.chunk_id,
                size = header.chunk_size,
                "chunk acknowledged"
            );

            if tracker.should_update() {
                self.publish(tracker.update(reader.offset()));
            }
        }

        let total_chunks = reader.chunks_read();
        let total_bytes = reader.offset();
        if !checksums_match(&reader.finalize(), &checksum) {
            warn!(transfer_id = %self.transfer_id, "file changed while it was being sent");
        }
        transition(&mut self.state, TransferState::Verifying, &self.transfer_id);

        let receiver_result: TransferResult =
            guarded(&self.cancel, self.idle_timeout, receive_json(&mut self.stream)).await?;
        let stats = SenderStats {
            total_chunks,
            total_bytes,
            elapsed: started.elapsed(),
            checksum,
        };
        let merged = merge_results(receiver_result, &stats);

        if merged.is_complete() {
            self.publish(tracker.finish());
            transition(&mut self.state, TransferState::Complete, &self.transfer_id);
            info!(
                transfer_id = %self.transfer_id,
                bytes = stats.total_bytes,
                chunks = stats.total_chunks,
                verified = merged.checksum_verified(),
                "transfer complete"
            );
        } else {
            transition(&mut self.state, TransferState::Failed, &self.transfer_id);
            warn!(
                transfer_id = %self.transfer_id,
                error = merged.error().unwrap_or_default(),
                "receiver reported failure"
            );
        }
        Ok(merged)
    }

    fn publish(&self, snapshot: ProgressSnapshot) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.try_send(snapshot);
        }
    }
}

/// Accepts only a `received` ack for exactly `chunk_id`.
fn check_ack(reply: ChunkReply, chunk_id: u64) -> Result<(), DataChannelError> {
    match reply {
        ChunkReply::Ack(ack) if ack.chunk_id != chunk_id => Err(DataChannelError::Protocol(
            format!("ack for chunk {} while waiting for chunk {chunk_id}", ack.chunk_id),
        )),
        ChunkReply::Ack(ack) if ack.status != AckStatus::Received => Err(
            DataChannelError::Rejected(format!("chunk {chunk_id} not accepted: {}", ack.message)),
        ),
        ChunkReply::Ack(_) => Ok(()),
        ChunkReply::Rejected(failure) => Err(DataChannelError::Rejected(format!(
            "{}: {}",
            failure.error, failure.message
        ))),
    }
}

/// Overlays the receiver's verification outcome on the sender's statistics.
fn merge_results(receiver: TransferResult, stats: &SenderStats) -> TransferResult {
    match receiver {
        TransferResult::Success(summary) => TransferResult::Success(TransferSummary {
            transfer_complete: summary.transfer_complete,
            total_chunks: Some(stats.total_chunks),
            total_bytes: stats.total_bytes,
            transfer_time_ms: transfer_time_ms(stats.elapsed),
            average_speed_mbps: average_speed_mbps(stats.total_bytes, stats.elapsed),
            file_checksum: stats.checksum.clone(),
            checksum_verified: summary.checksum_verified,
            file_path: summary.file_path,
        }),
        TransferResult::Failure(mut failure) => {
            failure.total_bytes.get_or_insert(stats.total_bytes);
            failure
                .file_checksum
                .get_or_insert_with(|| stats.checksum.clone());
            TransferResult::Failure(failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synergy_protocol::{ChunkAck, ReadyResponse, TransferFailure};

    use crate::test_support::write_file;
    use crate::wire::{read_exact_bytes, send_json};

    fn stats() -> SenderStats {
        SenderStats {
            total_chunks: 4,
            total_bytes: 1_048_576,
            elapsed: Duration::from_secs(1),
            checksum: "ab".repeat(32),
        }
    }

    #[test]
    fn merge_overlays_receiver_verification() {
        let receiver = TransferResult::Success(TransferSummary {
            transfer_complete: true,
            total_chunks: None,
            total_bytes: 1_048_576,
            transfer_time_ms: 999,
            average_speed_mbps: 1.0,
            file_checksum: "ab".repeat(32),
            checksum_verified: true,
            file_path: "/srv/received/a.bin".into(),
        });

        let merged = merge_results(receiver, &stats());
        let summary = merged.as_summary().unwrap();
        assert_eq!(summary.total_chunks, Some(4));
        assert_eq!(summary.transfer_time_ms, 1000);
        assert_eq!(summary.average_speed_mbps, 8.0);
        assert!(summary.checksum_verified);
        assert_eq!(summary.file_path, "/srv/received/a.bin");
    }

    #[test]
    fn merge_keeps_receiver_failure() {
        let receiver = TransferResult::Failure(TransferFailure {
            transfer_complete: false,
            error: "file_checksum_mismatch".into(),
            message: "digest differs".into(),
            checksum_verified: Some(false),
            file_checksum: Some("cd".repeat(32)),
            total_bytes: None,
        });

        let merged = merge_results(receiver, &stats());
        assert!(!merged.is_complete());
        assert_eq!(merged.error(), Some("file_checksum_mismatch"));
        assert_eq!(merged.total_bytes(), Some(1_048_576));
        let TransferResult::Failure(f) = merged else {
            panic!("expected failure");
        };
        assert_eq!(f.file_checksum, Some("cd".repeat(32)));
    }

    #[test]
    fn ack_checks() {
        assert!(check_ack(ChunkReply::Ack(ChunkAck::received(2)), 2).is_ok());
        assert!(matches!(
            check_ack(ChunkReply::Ack(ChunkAck::received(1)), 2),
            Err(DataChannelError::Protocol(_))
        ));
        let error_ack = ChunkAck {
            chunk_id: 2,
            status: AckStatus::Error,
            message: "disk full".into(),
        };
        assert!(matches!(
            check_ack(ChunkReply::Ack(error_ack), 2),
            Err(DataChannelError::Rejected(_))
        ));
    }

    /// A scripted receiver that acks the wrong chunk id.
    #[tokio::test]
    async fn mismatched_ack_aborts_sender() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "data.bin", &[1u8; 100]);
        let (client, mut server) = tokio::io::duplex(64 * 1024);

        let peer = tokio::spawn(async move {
            let handshake: TransferHandshake = receive_json(&mut server).await.unwrap();
            send_json(&mut server, &ReadyResponse::ready(&handshake.transfer_id))
                .await
                .unwrap();
            let header: ChunkHeader = receive_json(&mut server).await.unwrap();
            read_exact_bytes(&mut server, header.chunk_size as usize)
                .await
                .unwrap();
            send_json(&mut server, &ChunkAck::received(header.chunk_id + 5))
                .await
                .unwrap();
            server
        });

        let mut sender = SenderSession::new(client, CancellationToken::new()).with_chunk_size(40);
        let result = sender.send_file(&path).await;
        assert!(matches!(result, Err(DataChannelError::Protocol(_))));
        assert_eq!(sender.state(), TransferState::Failed);
        drop(peer.await.unwrap());
    }

    /// The receiver takes part of the first chunk and hangs up.
    #[tokio::test]
    async fn receiver_dropping_mid_chunk_is_connection_loss() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "big.bin", &vec![3u8; 256 * 1024]);
        let (client, mut server) = tokio::io::duplex(4096);

        let peer = tokio::spawn(async move {
            let handshake: TransferHandshake = receive_json(&mut server).await.unwrap();
            send_json(&mut server, &ReadyResponse::ready(&handshake.transfer_id))
                .await
                .unwrap();
            let header: ChunkHeader = receive_json(&mut server).await.unwrap();
            assert_eq!(header.chunk_id, 1);
            read_exact_bytes(&mut server, 1000).await.unwrap();
        });

        let mut sender =
            SenderSession::new(client, CancellationToken::new()).with_chunk_size(256 * 1024);
        let err = sender.send_file(&path).await.unwrap_err();
        peer.await.unwrap();

        assert!(err.is_connection_lost(), "unexpected error: {err:?}");
        assert_eq!(sender.state(), TransferState::Failed);
        let record = err.to_result();
        assert!(!record.is_complete());
        assert_eq!(record.error(), Some("connection_lost"));
    }

    #[tokio::test]
    async fn not_ready_reply_is_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "data.bin", b"payload");
        let (client, mut server) = tokio::io::duplex(64 * 1024);

        let peer = tokio::spawn(async move {
            let _: TransferHandshake = receive_json(&mut server).await.unwrap();
            let busy = ReadyResponse {
                status: "busy".into(),
                message: "another transfer is running".into(),
                transfer_id: String::new(),
            };
            send_json(&mut server, &busy).await.unwrap();
            server
        });

        let mut sender = SenderSession::new(client, CancellationToken::new());
        let result = sender.send_file(&path).await;
        assert!(matches!(result, Err(DataChannelError::Rejected(_))));
        drop(peer.await.unwrap());
    }

    #[tokio::test]
    async fn session_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "data.bin", b"x");
        let (client, server) = tokio::io::duplex(1024);
        drop(server);

        let mut sender = SenderSession::new(client, CancellationToken::new());
        assert!(sender.send_file(&path).await.is_err());
        assert!(matches!(
            sender.send_file(&path).await,
            Err(DataChannelError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "data.bin", b"x");
        let (client, _server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut sender = SenderSession::new(client, cancel);
        let result = sender.send_file(&path).await;
        assert!(matches!(result, Err(DataChannelError::Cancelled)));
    }
}
