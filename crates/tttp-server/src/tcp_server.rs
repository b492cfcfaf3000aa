//! TCP listener that accepts peers and hands them to the coordinator.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, watch};
use tttp_config::DEFAULT_PORT;
use tttp_protocol::FrameConfig;

use crate::coordinator::Coordinator;

/// Unique identifier for a TCP connection within a server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pause after a failed `accept()` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of accepted TCP streams for the accept loop.
trait Accept {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// Error returned when the server is at its connection limit.
#[derive(Debug, thiserror::Error)]
#[error("connection limit reached")]
pub struct ConnectionLimitReached;

/// Thread-safe registry of live peers keyed by [`ConnectionId`].
pub struct ConnectionMap {
    inner: RwLock<HashMap<ConnectionId, SocketAddr>>,
    max_connections: usize,
}

impl ConnectionMap {
    /// Create a new map with the given capacity limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Register a peer. Returns `Err` if the map is at capacity.
    pub async fn insert(
        &self,
        id: ConnectionId,
        peer_addr: SocketAddr,
    ) -> Result<(), ConnectionLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }
        map.insert(id, peer_addr);
        Ok(())
    }

    /// Remove a peer by ID, returning its address.
    pub async fn remove(&self, id: &ConnectionId) -> Option<SocketAddr> {
        self.inner.write().await.remove(id)
    }

    /// Return the number of live peers.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Return whether no peer is connected.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Configuration for [`GameServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Default: `0.0.0.0:58901`.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections. Default: 200.
    pub max_connections: usize,
    /// Frame limits applied to every connection.
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 200,
            frame: FrameConfig::default(),
        }
    }
}

/// TCP match server: accepts peers, pairs them, and runs their sessions.
pub struct GameServer {
    config: ServerConfig,
    /// Live connection registry (public for test inspection).
    pub connections: Arc<ConnectionMap>,
    coordinator: Coordinator,
    id_gen: IdGenerator,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GameServer {
    /// Create a new server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            connections: Arc::new(ConnectionMap::new(config.max_connections)),
            coordinator: Coordinator::new(config.frame.clone(), shutdown_rx.clone()),
            id_gen: IdGenerator::new(),
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    ///
    /// A failed `accept()` (a connection aborted mid-handshake, or the
    /// process out of file descriptors) is logged and retried after a short
    /// pause; running matches are unaffected.
    pub async fn run_with_listener(&self, listener: TcpListener) -> io::Result<()> {
        self.serve(listener).await;
        Ok(())
    }

    async fn serve<L: Accept>(&self, listener: L) {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed: {e}");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("TCP_NODELAY on {peer_addr} failed: {e}");
                    }

                    let id = self.id_gen.next_id();
                    if self.connections.insert(id, peer_addr).await.is_err() {
                        tracing::warn!("Connection limit reached, rejecting {peer_addr}");
                        drop(stream);
                        continue;
                    }

                    tracing::info!("Accepted connection {id:?} from {peer_addr}");

                    let (reader, writer) = stream.into_split();
                    let session = self.coordinator.admit(id, reader, writer);
                    let connections = Arc::clone(&self.connections);

                    tokio::spawn(async move {
                        if let Err(e) = session.await {
                            tracing::error!("Session for {id:?} panicked: {e}");
                        }
                        connections.remove(&id).await;
                        tracing::info!("Connection {id:?} closed");
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Server shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Signal the accept loop and every running session to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
