//! Receiving side of a transfer.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use synergy_protocol::constants::{DEFAULT_MAX_CHUNK_SIZE, PROGRESS_UPDATE_INTERVAL};
use synergy_protocol::{
    ChunkAck, ChunkHeader, ReadyResponse, TransferFailure, TransferHandshake, TransferResult,
    TransferSummary,
};
use synergy_transfer::{
    ChecksumEngine, PartialFile, ProgressSender, ProgressSnapshot, ProgressTracker,
    average_speed_mbps, checksums_match, resolve_receive_path, transfer_time_ms,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::FAILURE_REPLY_TIMEOUT;
use crate::error::DataChannelError;
use crate::guard::{guarded, guarded_read_exact};
use crate::state::{TransferState, transition};
use crate::wire::{receive_json, send_json};

/// Receiver settings.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Directory received files are written into.
    pub receive_dir: PathBuf,
    /// Largest chunk a sender may announce or send.
    pub max_chunk_size: usize,
    pub progress_interval: Duration,
    /// Fails the transfer if the sender stays silent this long.
    pub idle_timeout: Option<Duration>,
}

impl ReceiverConfig {
    pub fn new(receive_dir: impl Into<PathBuf>) -> Self {
        Self {
            receive_dir: receive_dir.into(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            progress_interval: PROGRESS_UPDATE_INTERVAL,
            idle_timeout: None,
        }
    }
}

/// Receives one file from a sender over `stream`.
///
/// The destination file is removed on every exit path except a verified
/// completion.
pub struct ReceiverSession<S> {
    stream: S,
    config: ReceiverConfig,
    cancel: CancellationToken,
    progress_tx: Option<ProgressSender>,
    state: TransferState,
    transfer_id: String,
}

impl<S> ReceiverSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: ReceiverConfig, cancel: CancellationToken) -> Self {
        Self {
            stream,
            config,
            cancel,
            progress_tx: None,
            state: TransferState::Idle,
            transfer_id: String::new(),
        }
    }

    pub fn with_progress(mut self, progress_tx: ProgressSender) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Identifier from the sender's handshake; empty until it arrives.
    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    /// Runs the transfer to its end.
    ///
    /// Returns `Ok` once a result record was sent to the sender, which may
    /// itself be a failure (whole-file checksum mismatch). Any abort is an
    /// `Err`; the peer is told about it on a best-effort basis.
    pub async fn receive(&mut self) -> Result<TransferResult, DataChannelError> {
        if self.state != TransferState::Idle {
            return Err(DataChannelError::Protocol(format!(
                "receiver session already used (state {})",
                self.state
            )));
        }

        match self.run().await {
            Ok(result) => Ok(result),
            Err(err) => {
                error!(transfer_id = %self.transfer_id, kind = err.kind(), "receive failed: {err}");
                if !self.state.is_terminal() {
                    transition(&mut self.state, TransferState::Failed, &self.transfer_id);
                }
                if !err.is_connection_lost() {
                    self.report_failure(&err).await;
                }
                Err(err)
            }
        }
    }

    async fn run(&mut self) -> Result<TransferResult, DataChannelError> {
        transition(&mut self.state, TransferState::AwaitingHandshake, "");
        let handshake: TransferHandshake = guarded(
            &self.cancel,
            self.config.idle_timeout,
            receive_json(&mut self.stream),
        )
        .await?;
        self.transfer_id = handshake.transfer_id.clone();
        let meta = &handshake.file_metadata;
        info!(
            transfer_id = %self.transfer_id,
            file = %meta.name,
            size = meta.size,
            chunk_size = meta.chunk_size,
            "handshake received"
        );

        if !handshake.is_compatible() {
            return Err(DataChannelError::Protocol(format!(
                "unsupported protocol version {:?}",
                handshake.protocol_version
            )));
        }
        if meta.chunk_size == 0 {
            return Err(DataChannelError::Protocol("chunk size must be non-zero".into()));
        }
        if meta.chunk_size > self.config.max_chunk_size as u64 {
            return Err(DataChannelError::ChunkTooLarge {
                size: meta.chunk_size,
                max: self.config.max_chunk_size as u64,
            });
        }
        let dest = resolve_receive_path(&self.config.receive_dir, &meta.name)?;

        let mut out = PartialFile::create(&dest).await?;
        guarded(
            &self.cancel,
            self.config.idle_timeout,
            send_json(&mut self.stream, &ReadyResponse::ready(&self.transfer_id)),
        )
        .await?;
        transition(&mut self.state, TransferState::Transferring, &self.transfer_id);

        let started = Instant::now();
        let mut engine = ChecksumEngine::new();
        let mut tracker = ProgressTracker::new(meta.size, self.config.progress_interval);
        let mut expected_id = 1;

        while out.written() < meta.size {
            let header: ChunkHeader = guarded(
                &self.cancel,
                self.config.idle_timeout,
                receive_json(&mut self.stream),
            )
            .await?;
            check_header(
                &header,
                expected_id,
                out.written(),
                meta.size,
                self.config.max_chunk_size,
            )?;

            let data = guarded_read_exact(
                &mut self.stream,
                header.chunk_size as usize,
                &self.cancel,
                self.config.idle_timeout,
            )
            .await?;
            engine
                .verify_chunk(&data, &header.chunk_checksum)
                .map_err(|_| DataChannelError::ChecksumMismatch {
                    chunk_id: header.chunk_id,
                })?;
            out.append(&data).await?;

            if header.is_last_chunk != (out.written() >= meta.size) {
                warn!(
                    transfer_id = %self.transfer_id,
                    chunk_id = header.chunk_id,
                    "is_last_chunk flag disagrees with byte count"
                );
            }

            guarded(
                &self.cancel,
                self.config.idle_timeout,
                send_json(&mut self.stream, &ChunkAck::received(header.chunk_id)),
            )
            .await?;
            debug!(
                transfer_id = %self.transfer_id,
                chunk_id = header.chunk_id,
                received = out.written(),
                "chunk stored"
            );

            expected_id += 1;
            if tracker.should_update() {
                self.publish(tracker.update(out.written()));
            }
        }

        transition(&mut self.state, TransferState::Verifying, &self.transfer_id);
        let elapsed = started.elapsed();
        let total_bytes = out.written();
        let digest = engine.finalize();

        let result = if checksums_match(&digest, &meta.checksum) {
            let path = out.commit().await?;
            TransferResult::Success(TransferSummary {
                transfer_complete: true,
                total_chunks: None,
                total_bytes,
                transfer_time_ms: transfer_time_ms(elapsed),
                average_speed_mbps: average_speed_mbps(total_bytes, elapsed),
                file_checksum: digest,
                checksum_verified: true,
                file_path: path.display().to_string(),
            })
        } else {
            out.discard().await;
            let err = DataChannelError::FileChecksumMismatch {
                expected: meta.checksum.clone(),
                actual: digest.clone(),
            };
            warn!(transfer_id = %self.transfer_id, "{err}");
            TransferResult::Failure(TransferFailure {
                transfer_complete: false,
                error: err.kind().into(),
                message: err.to_string(),
                checksum_verified: Some(false),
                file_checksum: Some(digest),
                total_bytes: Some(total_bytes),
            })
        };

        guarded(
            &self.cancel,
            self.config.idle_timeout,
            send_json(&mut self.stream, &result),
        )
        .await?;

        if result.is_complete() {
            self.publish(tracker.finish());
            transition(&mut self.state, TransferState::Complete, &self.transfer_id);
            info!(
                transfer_id = %self.transfer_id,
                path = %dest.display(),
                bytes = total_bytes,
                "file received and verified"
            );
        } else {
            transition(&mut self.state, TransferState::Failed, &self.transfer_id);
        }
        Ok(result)
    }

    /// Sends a failure record for `err`, giving up quietly if the peer
    /// does not take it within [`FAILURE_REPLY_TIMEOUT`].
    async fn report_failure(&mut self, err: &DataChannelError) {
        let record = err.to_result();
        match tokio::time::timeout(FAILURE_REPLY_TIMEOUT, send_json(&mut self.stream, &record))
            .await
        {
            Ok(Ok(())) => debug!(transfer_id = %self.transfer_id, "failure reported to sender"),
            Ok(Err(e)) => debug!(transfer_id = %self.transfer_id, "could not report failure: {e}"),
            Err(_) => debug!(transfer_id = %self.transfer_id, "timed out reporting failure"),
        }
    }

    fn publish(&self, snapshot: ProgressSnapshot) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.try_send(snapshot);
        }
    }
}

/// Validates a chunk header against what the receiver expects next.
fn check_header(
    header: &ChunkHeader,
    expected_id: u64,
    received: u64,
    total: u64,
    max_chunk_size: usize,
) -> Result<(), DataChannelError> {
    if header.chunk_id != expected_id {
        return Err(DataChannelError::Protocol(format!(
            "got chunk {} while expecting chunk {expected_id}",
            header.chunk_id
        )));
    }
    if header.chunk_size == 0 {
        return Err(DataChannelError::Protocol(format!(
            "chunk {} is empty",
            header.chunk_id
        )));
    }
    if header.chunk_size > max_chunk_size as u64 {
        return Err(DataChannelError::ChunkTooLarge {
            size: header.chunk_size,
            max: max_chunk_size as u64,
        });
    }
    if received + header.chunk_size > total {
        return Err(DataChannelError::Protocol(format!(
            "chunk {} overruns the declared size of {total} bytes",
            header.chunk_id
        )));
    }
    Ok(())
}
