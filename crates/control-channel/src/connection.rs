use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use synergy_protocol::ControlMessage;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::CONTROL_QUEUE_CAPACITY;
use crate::error::ControlError;
use crate::pumps::listener::listener_pump;
use crate::pumps::sender::sender_pump;

/// Pending message counts on each side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueSizes {
    pub inbound: usize,
    pub outbound: usize,
}

/// A live control connection over any byte stream.
///
/// Dropping the connection stops both pumps.
pub struct ControlConnection {
    outbound_tx: mpsc::Sender<ControlMessage>,
    inbound_rx: mpsc::Receiver<ControlMessage>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
}

impl ControlConnection {
    /// Splits `stream` and starts the listener and sender pumps.
    ///
    /// `cancel` is the parent token; closing the connection only cancels a
    /// child of it.
    pub fn spawn<S>(stream: S, cancel: &CancellationToken) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (inbound_tx, inbound_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = cancel.child_token();

        let listener = tokio::spawn(listener_pump(
            reader,
            inbound_tx,
            connected.clone(),
            cancel.clone(),
        ));
        let sender = tokio::spawn(sender_pump(
            writer,
            outbound_rx,
            connected.clone(),
            cancel.clone(),
        ));

        info!("control connection started");

        Self {
            outbound_tx,
            inbound_rx,
            connected,
            cancel,
            listener: Some(listener),
            sender: Some(sender),
        }
    }

    /// Queues a message for the sender pump.
    pub async fn send(&self, msg: ControlMessage) -> Result<(), ControlError> {
        if !self.is_connected() {
            return Err(ControlError::Disconnected);
        }
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| ControlError::Disconnected)
    }

    /// Waits for the next inbound message.
    ///
    /// Returns `None` once the peer has gone away and the queue is empty.
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.inbound_rx.recv().await
    }

    /// Takes every message already queued without waiting.
    pub fn drain(&mut self) -> Vec<ControlMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.inbound_rx.try_recv() {
            out.push(msg);
        }
        out
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn queue_sizes(&self) -> QueueSizes {
        QueueSizes {
            inbound: self.inbound_rx.len(),
            outbound: self.outbound_tx.max_capacity() - self.outbound_tx.capacity(),
        }
    }

    /// Signals both pumps to stop. Queued outbound messages may be lost.
    pub fn close(&self) {
        debug!("closing control connection");
        self.connected.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    /// Closes the connection and waits for both pumps to exit.
    pub async fn close_and_wait(mut self) {
        self.close();
        if let Some(handle) = self.listener.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.sender.take() {
            let _ = handle.await;
        }
        info!("control connection closed");
    }
}

impl Drop for ControlConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
