use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use synergy_data_channel::ReceiverSession;
use synergy_protocol::TransferResult;
use synergy_transfer::ProgressSnapshot;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::{EVENT_CHANNEL_CAPACITY, ServerError};

const LISTEN_BACKLOG: u32 = 16;
/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);
const PROGRESS_QUEUE_CAPACITY: usize = 32;

/// Notifications published to the subscriber.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Progress(ProgressSnapshot),
    /// Terminal record of one connection, successful or not.
    Completed(TransferResult),
}

/// Snapshot returned by [`TransferServer::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    /// Peer address of the connection being served.
    pub active_transfer: Option<String>,
}

/// State shared between the server handle and its accept loop.
#[derive(Default)]
struct Shared {
    completed: AtomicU64,
    failed: AtomicU64,
    active: Mutex<Option<String>>,
    events: Mutex<Option<mpsc::Sender<TransferEvent>>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Receives files over TCP, one connection at a time.
pub struct TransferServer {
    config: ServerConfig,
    shared: Arc<Shared>,
    running: Option<Running>,
}

impl TransferServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            running: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Returns a channel of progress and completion events.
    ///
    /// Only the most recent subscriber receives events. Progress is dropped
    /// when the channel is full; completions wait for room.
    pub async fn subscribe(&self) -> mpsc::Receiver<TransferEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        *self.shared.events.lock().await = Some(tx);
        rx
    }

    /// Binds `bind_address:port` and starts the accept loop.
    ///
    /// Port 0 picks a free port; the bound address is returned.
    pub async fn start(&mut self, bind_address: &str, port: u16) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = tokio::net::lookup_host((bind_address, port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no address for {bind_address}"),
                )
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        let local_addr = listener.local_addr()?;

        tokio::fs::create_dir_all(&self.config.receive_dir).await?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(accept_loop(
            listener,
            self.config.clone(),
            Arc::clone(&self.shared),
            cancel.clone(),
        ));

        info!(
            %local_addr,
            receive_dir = %self.config.receive_dir.display(),
            "transfer server listening"
        );

        self.running = Some(Running {
            cancel,
            handle,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stops accepting, cancels any in-flight transfer and waits for the
    /// accept loop to exit.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let running = self.running.take().ok_or(ServerError::NotRunning)?;
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            error!("accept loop panicked: {e}");
        }
        info!(addr = %running.local_addr, "transfer server stopped");
        Ok(())
    }

    pub async fn status(&self) -> ServerStatus {
        let addr = self.local_addr();
        ServerStatus {
            running: self.running.is_some(),
            address: addr.map(|a| a.ip()),
            port: addr.map(|a| a.port()),
            transfers_completed: self.shared.completed.load(Ordering::Relaxed),
            transfers_failed: self.shared.failed.load(Ordering::Relaxed),
            active_transfer: self.shared.active.lock().await.clone(),
        }
    }
}

impl Drop for TransferServer {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

/// Serves connections one after another until cancelled.
async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        let (stream, peer_addr) = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("accept error: {e}");
                    if !accept_backoff(&cancel).await {
                        break;
                    }
                    continue;
                }
            },
        };

        handle_connection(stream, peer_addr, &config, &shared, &cancel).await;
    }
    debug!("accept loop exited");
}

/// Waits out a failed accept. Returns `false` if cancelled meanwhile.
async fn accept_backoff(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: &ServerConfig,
    shared: &Shared,
    cancel: &CancellationToken,
) {
    info!(%peer_addr, "transfer connection accepted");
    if let Err(e) = stream.set_nodelay(true) {
        warn!(%peer_addr, "failed to set TCP_NODELAY: {e}");
    }
    *shared.active.lock().await = Some(peer_addr.to_string());

    let events = shared.events.lock().await.clone();
    let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_QUEUE_CAPACITY);
    let forwarder = {
        let events = events.clone();
        tokio::spawn(async move {
            while let Some(snapshot) = progress_rx.recv().await {
                if let Some(tx) = &events {
                    let _ = tx.try_send(TransferEvent::Progress(snapshot));
                }
            }
        })
    };

    let mut session = ReceiverSession::new(stream, config.receiver_config(), cancel.child_token())
        .with_progress(progress_tx);
    let result = match session.receive().await {
        Ok(result) => result,
        Err(e) => e.to_result(),
    };
    // Closes the socket and the progress sender.
    drop(session);
    let _ = forwarder.await;

    if result.is_complete() {
        shared.completed.fetch_add(1, Ordering::Relaxed);
        info!(%peer_addr, bytes = ?result.total_bytes(), "transfer completed");
    } else {
        shared.failed.fetch_add(1, Ordering::Relaxed);
        warn!(%peer_addr, error = ?result.error(), "transfer failed");
    }
    *shared.active.lock().await = None;

    if let Some(tx) = events {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tx.send(TransferEvent::Completed(result)) => {}
        }
    }
}
