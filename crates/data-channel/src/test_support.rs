//! Helpers shared by the session tests.

use std::path::{Path, PathBuf};

use synergy_protocol::TransferResult;
use tokio_util::sync::CancellationToken;

use crate::error::DataChannelError;
use crate::receiver::{ReceiverConfig, ReceiverSession};
use crate::sender::SenderSession;

pub(crate) fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

pub(crate) type Outcome = Result<TransferResult, DataChannelError>;

/// Runs a sender and a receiver against each other over an in-memory pipe.
pub(crate) async fn run_pair(
    source: &Path,
    receive_dir: &Path,
    chunk_size: usize,
) -> (Outcome, Outcome) {
    let (client, server) = tokio::io::duplex(256 * 1024);
    let cancel = CancellationToken::new();

    let mut sender = SenderSession::new(client, cancel.clone()).with_chunk_size(chunk_size);
    let mut receiver =
        ReceiverSession::new(server, ReceiverConfig::new(receive_dir), cancel.clone());

    // Each side drops its end as soon as it finishes so the peer sees EOF.
    let send = async move {
        let outcome = sender.send_file(source).await;
        drop(sender);
        outcome
    };
    let receive = async move {
        let outcome = receiver.receive().await;
        drop(receiver);
        outcome
    };
    tokio::join!(send, receive)
}
