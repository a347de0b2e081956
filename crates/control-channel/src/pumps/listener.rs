//! Listener pump: reads frames and queues valid control messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use synergy_data_channel::DataChannelError;
use synergy_data_channel::wire::receive_message_bounded;
use synergy_protocol::ControlMessage;
use synergy_protocol::constants::MAX_CONTROL_MESSAGE_SIZE;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::ControlError;

/// Reads control messages until EOF, a read error, or cancellation.
///
/// Malformed messages are logged and dropped. On exit the connection is
/// marked disconnected and `cancel` is triggered so the sender pump stops
/// too.
pub(crate) async fn listener_pump<R>(
    mut reader: R,
    inbound_tx: mpsc::Sender<ControlMessage>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = receive_message_bounded(&mut reader, MAX_CONTROL_MESSAGE_SIZE) => {
                match frame {
                    Ok(value) => match parse_message(value) {
                        Ok(msg) => {
                            trace!(id = %msg.message_id, action = ?msg.action, "control message received");
                            // A full queue must not outlive a close.
                            let queued = tokio::select! {
                                _ = cancel.cancelled() => false,
                                sent = inbound_tx.send(msg) => sent.is_ok(),
                            };
                            if !queued {
                                debug!("inbound queue closed or connection cancelled");
                                break;
                            }
                        }
                        Err(e) => warn!("dropping control message: {e}"),
                    },
                    // The frame was consumed whole, so the stream is still aligned.
                    Err(DataChannelError::Json(e)) => warn!("dropping undecodable frame: {e}"),
                    Err(e) if e.is_connection_lost() => {
                        debug!("control stream ended: {e}");
                        break;
                    }
                    Err(e) => {
                        warn!("control read error: {e}");
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::Release);
    cancel.cancel();
}

/// Checks a decoded frame against the control envelope.
pub(crate) fn parse_message(value: serde_json::Value) -> Result<ControlMessage, ControlError> {
    let msg: ControlMessage = serde_json::from_value(value)
        .map_err(|e| ControlError::InvalidMessage(e.to_string()))?;
    if msg.message_id.is_empty() {
        return Err(ControlError::InvalidMessage("empty message_id".into()));
    }
    Ok(msg)
}
