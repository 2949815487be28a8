//! Unix-domain-socket transport
//!
//! The broker binds a socket path; node processes connect to it. Frames are
//! newline-delimited UTF-8 lines.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, info};

use crate::error::{IpcError, Result};
use crate::traits::{IpcEvent, IpcReceiver, IpcSender, IpcServer};

/// Longest accepted line. Matches the protocol frame ceiling.
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Sender half of one socket connection
pub struct UnixSocketSender {
    tx: mpsc::Sender<String>,
    connected: Arc<Mutex<bool>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl IpcSender for UnixSocketSender {
    async fn send(&self, frame: String) -> Result<()> {
        if !self.is_connected() {
            return Err(IpcError::NotConnected);
        }
        self.tx
            .send(frame)
            .await
            .map_err(|e| IpcError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        // Stopping the writer task drops the write half, which sends the
        // peer its EOF.
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }
        *self.connected.lock() = false;
        Ok(())
    }
}

/// Receiver half of one socket connection
pub struct UnixSocketReceiver {
    rx: mpsc::Receiver<IpcEvent>,
}

#[async_trait]
impl IpcReceiver for UnixSocketReceiver {
    async fn recv(&mut self) -> Option<IpcEvent> {
        self.rx.recv().await
    }
}

/// Wire one accepted/established stream into sender/receiver halves with
/// dedicated reader and writer tasks.
fn spawn_io(stream: UnixStream, peer: String) -> (UnixSocketSender, UnixSocketReceiver) {
    let (read_half, write_half) = stream.into_split();
    let mut framed_read =
        FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let mut framed_write =
        FramedWrite::new(write_half, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    let (send_tx, mut send_rx) = mpsc::channel::<String>(100);
    let (event_tx, event_rx) = mpsc::channel::<IpcEvent>(100);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    let peer_write = peer.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_line = send_rx.recv() => match maybe_line {
                    Some(line) => {
                        if let Err(e) = framed_write.send(line).await {
                            error!("write error to {}: {}", peer_write, e);
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut shutdown_rx => break,
            }
        }
        *connected_write.lock() = false;
    });

    tokio::spawn(async move {
        loop {
            match framed_read.next().await {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if event_tx.send(IpcEvent::Frame(line)).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    error!("read error from {}: {}", peer, e);
                    let _ = event_tx.send(IpcEvent::Error(e.to_string())).await;
                    let _ = event_tx
                        .send(IpcEvent::Disconnected {
                            reason: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
                None => {
                    debug!("peer {} closed the socket", peer);
                    let _ = event_tx.send(IpcEvent::Disconnected { reason: None }).await;
                    break;
                }
            }
        }
        *connected_read.lock() = false;
    });

    (
        UnixSocketSender {
            tx: send_tx,
            connected,
            shutdown: Mutex::new(Some(shutdown_tx)),
        },
        UnixSocketReceiver { rx: event_rx },
    )
}

/// Listener bound to a socket path
pub struct UnixSocketServer {
    listener: UnixListener,
    path: PathBuf,
    accepted: AtomicU64,
}

impl UnixSocketServer {
    /// Bind the named channel, replacing any stale socket file left behind
    /// by a previous run.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("removed stale socket file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(IpcError::BindFailed(e.to_string())),
        }
        let listener =
            UnixListener::bind(&path).map_err(|e| IpcError::BindFailed(e.to_string()))?;
        info!("listening on {}", path.display());
        Ok(Self {
            listener,
            path,
            accepted: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IpcServer for UnixSocketServer {
    type Sender = UnixSocketSender;
    type Receiver = UnixSocketReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, String)> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;
        let n = self.accepted.fetch_add(1, Ordering::Relaxed);
        let peer = format!("uds-{}", n);
        debug!("accepted connection {}", peer);
        let (sender, receiver) = spawn_io(stream, peer.clone());
        Ok((sender, receiver, peer))
    }

    async fn close(&self) -> Result<()> {
        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }
}

impl Drop for UnixSocketServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Node-side connector
pub struct UnixSocketConnector;

impl UnixSocketConnector {
    pub async fn connect(
        path: impl AsRef<Path>,
    ) -> Result<(UnixSocketSender, UnixSocketReceiver)> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;
        debug!("connected to {}", path.display());
        Ok(spawn_io(stream, path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        let mut server = UnixSocketServer::bind(&path).unwrap();

        let (client_tx, mut client_rx) = UnixSocketConnector::connect(&path).await.unwrap();
        let (server_tx, mut server_rx, _peer) = server.accept().await.unwrap();

        client_tx.send("hello broker".to_string()).await.unwrap();
        match server_rx.recv().await {
            Some(IpcEvent::Frame(line)) => assert_eq!(line, "hello broker"),
            other => panic!("unexpected event: {:?}", other),
        }

        server_tx.send("hello node".to_string()).await.unwrap();
        match client_rx.recv().await {
            Some(IpcEvent::Frame(line)) => assert_eq!(line, "hello node"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropping_the_client_surfaces_a_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        let mut server = UnixSocketServer::bind(&path).unwrap();

        let client = UnixSocketConnector::connect(&path).await.unwrap();
        let (_server_tx, mut server_rx, _peer) = server.accept().await.unwrap();
        drop(client);

        match server_rx.recv().await {
            Some(IpcEvent::Disconnected { .. }) => {}
            other => panic!("expected disconnect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn closing_the_sender_hangs_up_for_the_peer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        let mut server = UnixSocketServer::bind(&path).unwrap();

        let (client_tx, _client_rx) = UnixSocketConnector::connect(&path).await.unwrap();
        let (_server_tx, mut server_rx, _peer) = server.accept().await.unwrap();

        client_tx.close().await.unwrap();
        assert!(!client_tx.is_connected());

        match server_rx.recv().await {
            Some(IpcEvent::Disconnected { .. }) => {}
            other => panic!("expected disconnect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rebinding_replaces_a_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        {
            let _server = UnixSocketServer::bind(&path).unwrap();
        }
        // First server dropped; the path must be reusable.
        let _server = UnixSocketServer::bind(&path).unwrap();
    }
}
