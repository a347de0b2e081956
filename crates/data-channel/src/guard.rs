use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::DataChannelError;
use crate::wire::{read_exact_bytes, write_raw};

/// Raw chunk data moves in pieces of this size, each with a fresh idle timer.
pub(crate) const IO_SEGMENT_SIZE: usize = 64 * 1024;

/// Runs one I/O step, aborting on cancellation or when `idle_timeout`
/// elapses first.
///
/// The timeout bounds the whole step. Large payloads go through
/// [`guarded_read_exact`] and [`guarded_write_all`] instead, so a slow link
/// that keeps moving bytes is not mistaken for an idle one.
pub(crate) async fn guarded<T, F>(
    cancel: &CancellationToken,
    idle_timeout: Option<Duration>,
    step: F,
) -> Result<T, DataChannelError>
where
    F: Future<Output = Result<T, DataChannelError>>,
{
    let io = async move {
        match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, step)
                .await
                .unwrap_or_else(|_| Err(DataChannelError::Timeout)),
            None => step.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DataChannelError::Cancelled),
        result = io => result,
    }
}

/// Reads exactly `len` raw bytes, restarting the idle timer per segment.
pub(crate) async fn guarded_read_exact<R>(
    reader: &mut R,
    len: usize,
    cancel: &CancellationToken,
    idle_timeout: Option<Duration>,
) -> Result<Vec<u8>, DataChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let want = (len - data.len()).min(IO_SEGMENT_SIZE);
        let piece = guarded(cancel, idle_timeout, read_exact_bytes(&mut *reader, want)).await?;
        data.extend_from_slice(&piece);
    }
    Ok(data)
}

/// Writes `data` raw, restarting the idle timer per segment.
pub(crate) async fn guarded_write_all<W>(
    writer: &mut W,
    data: &[u8],
    cancel: &CancellationToken,
    idle_timeout: Option<Duration>,
) -> Result<(), DataChannelError>
where
    W: AsyncWrite + Unpin,
{
    for segment in data.chunks(IO_SEGMENT_SIZE) {
        guarded(cancel, idle_timeout, write_raw(&mut *writer, segment)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn passes_through_result() {
        let cancel = CancellationToken::new();
        let value = guarded(&cancel, None, async { Ok::<_, DataChannelError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancellation_wins_over_pending_step() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> = guarded(&cancel, None, std::future::pending()).await;
        assert!(matches!(result, Err(DataChannelError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_elapses() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> =
            guarded(&cancel, Some(Duration::from_secs(5)), std::future::pending()).await;
        assert!(matches!(result, Err(DataChannelError::Timeout)));
    }

    #[tokio::test]
    async fn slow_but_steady_read_is_not_idle() {
        let (mut peer, mut local) = tokio::io::duplex(IO_SEGMENT_SIZE * 4);
        let writer = tokio::spawn(async move {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                peer.write_all(&[9u8; IO_SEGMENT_SIZE]).await.unwrap();
            }
            peer
        });

        let cancel = CancellationToken::new();
        let data = guarded_read_exact(
            &mut local,
            IO_SEGMENT_SIZE * 4,
            &cancel,
            Some(Duration::from_millis(500)),
        )
        .await
        .unwrap();
        assert_eq!(data.len(), IO_SEGMENT_SIZE * 4);
        assert!(data.iter().all(|&b| b == 9));
        drop(writer.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_read_times_out() {
        let (mut peer, mut local) = tokio::io::duplex(IO_SEGMENT_SIZE * 2);
        peer.write_all(&[1u8; 100]).await.unwrap();

        let cancel = CancellationToken::new();
        let result =
            guarded_read_exact(&mut local, 1000, &cancel, Some(Duration::from_secs(5))).await;
        assert!(matches!(result, Err(DataChannelError::Timeout)));
        drop(peer);
    }

    #[tokio::test]
    async fn segmented_write_delivers_everything() {
        let (mut peer, mut local) = tokio::io::duplex(IO_SEGMENT_SIZE * 4);
        let payload: Vec<u8> = (0..IO_SEGMENT_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        let cancel = CancellationToken::new();

        guarded_write_all(&mut local, &payload, &cancel, None)
            .await
            .unwrap();
        let echoed = read_exact_bytes(&mut peer, payload.len()).await.unwrap();
        assert_eq!(echoed, payload);
    }
}
