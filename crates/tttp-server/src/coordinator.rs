//! Pairs incoming connections into matches in arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use tttp_game::MatchId;
use tttp_protocol::FrameConfig;

use crate::connection::PeerConnection;
use crate::session::{GameMatch, JoinRejected, PeerSession};
use crate::tcp_server::ConnectionId;

/// Hands each new connection a match and a mark.
///
/// Holds at most one pending match: the one whose `X` peer is waiting. The
/// next arrival joins it as `O`, or opens a fresh match when that peer has
/// already left. After handoff the coordinator keeps no reference to either
/// session.
pub struct Coordinator {
    pending: Mutex<Option<Arc<GameMatch>>>,
    next_match_id: AtomicU64,
    frame: FrameConfig,
    shutdown: watch::Receiver<bool>,
}

impl Coordinator {
    /// Sessions spawned by this coordinator stop when `shutdown` turns `true`.
    pub fn new(frame: FrameConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            pending: Mutex::new(None),
            next_match_id: AtomicU64::new(1),
            frame,
            shutdown,
        }
    }

    /// Pair a new connection and spawn its session.
    ///
    /// The returned handle resolves once the session has cleaned up and the
    /// connection is closed.
    pub fn admit<R, W>(&self, id: ConnectionId, reader: R, writer: W) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let connection = PeerConnection::spawn(id, reader, writer, self.frame.clone());
        let session = self.pair(connection);

        let match_id = session.game().id();
        let mark = session.mark();
        tracing::info!("Connection {id:?} plays {mark} in match {}", match_id.0);

        let span = tracing::info_span!(
            "session",
            connection = id.0,
            match_id = match_id.0,
            mark = %mark,
        );
        tokio::spawn(session.run().instrument(span))
    }

    /// Whether a match is waiting for its second peer.
    pub fn has_pending(&self) -> bool {
        self.lock_pending().is_some()
    }

    fn pair(&self, connection: PeerConnection) -> PeerSession {
        let mut pending = self.lock_pending();

        let connection = match pending.take() {
            Some(game) => match PeerSession::join(game, connection, self.shutdown.clone()) {
                Ok(session) => return session,
                Err(JoinRejected { reason, connection }) => {
                    tracing::debug!("Pending match unavailable ({reason}), opening a new one");
                    connection
                }
            },
            None => connection,
        };

        let match_id = MatchId(self.next_match_id.fetch_add(1, Ordering::Relaxed));
        let session = PeerSession::open(match_id, connection, self.shutdown.clone());
        *pending = Some(Arc::clone(session.game()));
        session
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<Arc<GameMatch>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
