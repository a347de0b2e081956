//! Sender pump: drains the outbound queue into frames.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use synergy_data_channel::wire::send_json;
use synergy_protocol::ControlMessage;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

/// Writes queued messages until the queue closes, a write fails, or
/// `cancel` fires. The write half is shut down on exit.
pub(crate) async fn sender_pump<W>(
    mut writer: W,
    mut outbound_rx: mpsc::Receiver<ControlMessage>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = outbound_rx.recv() => {
                match msg {
                    Some(msg) => {
                        if let Err(e) = send_json(&mut writer, &msg).await {
                            error!("control write error: {e}");
                            break;
                        }
                        trace!(id = %msg.message_id, action = ?msg.action, "control message sent");
                    }
                    None => break,
                }
            }
        }
    }

    connected.store(false, Ordering::Release);
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use synergy_data_channel::wire::receive_json;
    use synergy_protocol::ColorType;

    #[tokio::test]
    async fn writes_queued_messages_in_order() {
        let (local, mut peer) = tokio::io::duplex(64 * 1024);
        let (tx, rx) = mpsc::channel(8);
        let connected = Arc::new(AtomicBool::new(true));

        let handle = tokio::spawn(sender_pump(
            local,
            rx,
            connected.clone(),
            CancellationToken::new(),
        ));

        let first = ControlMessage::color_change(ColorType::Red);
        let second = ControlMessage::color_change_ack(ColorType::Red);
        tx.send(first.clone()).await.unwrap();
        tx.send(second.clone()).await.unwrap();

        let got: ControlMessage = receive_json(&mut peer).await.unwrap();
        assert_eq!(got, first);
        let got: ControlMessage = receive_json(&mut peer).await.unwrap();
        assert_eq!(got, second);

        drop(tx);
        handle.await.unwrap();
        assert!(!connected.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn stops_on_cancel_without_poll_delay() {
        let (local, _peer) = tokio::io::duplex(1024);
        let (_tx, rx) = mpsc::channel::<ControlMessage>(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(sender_pump(
            local,
            rx,
            Arc::new(AtomicBool::new(true)),
            cancel.clone(),
        ));
        cancel.cancel();

        tokio::time::timeout(std::time::Duration::from_millis(500), handle)
            .await
            .expect("should stop promptly")
            .expect("no panic");
    }
}
