//! Server-side actor for one connected peer.
//!
//! A [`PeerSession`] is built by the coordinator with its mark already fixed,
//! greets its peer, then handles one command at a time until the peer quits,
//! disconnects, sends something malformed, or the server shuts down. Every
//! exit path goes through the same cleanup.

use std::sync::Arc;

use tokio::sync::watch;
use tttp_game::{Match, MatchId, Outcome, PairingError, Phase};
use tttp_protocol::{
    ClientCommand, FrameError, Mark, ProtocolError, ServerMessage, WAITING_TEXT, YOUR_MOVE_TEXT,
};

use crate::connection::{Outbox, PeerConnection, deliver};

/// A match whose peers are reached through their outboxes.
pub type GameMatch = Match<Outbox>;

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading or decoding a frame failed, including a clean hangup.
    #[error("transport: {0}")]
    Transport(#[from] FrameError),
    /// The peer sent a line that is not a valid command.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// First peer of its match, opponent not yet arrived.
    AwaitingPairing,
    /// Both peers attached.
    Playing,
    /// The match has a result or the opponent left; only `QUIT` remains.
    Finished,
    /// Cleanup has started; the connection is being closed.
    Closed,
}

/// Why the command loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Quit,
    Shutdown,
}

/// Returned by [`PeerSession::join`] when the pending match cannot take a
/// second peer. The connection is handed back untouched.
pub struct JoinRejected {
    pub reason: PairingError,
    pub connection: PeerConnection,
}

/// Server-side state for one peer.
pub struct PeerSession {
    game: Arc<GameMatch>,
    mark: Mark,
    connection: PeerConnection,
    state: SessionState,
    shutdown: watch::Receiver<bool>,
}

impl PeerSession {
    /// Start a new match with this connection as [`Mark::X`].
    ///
    /// `WELCOME X` and `WAITING` are queued before the match exists anywhere
    /// else, so they always reach the peer first.
    pub fn open(
        match_id: MatchId,
        connection: PeerConnection,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let game = Arc::new(Match::new(match_id, connection.outbox()));
        connection.notify(ServerMessage::Welcome(Mark::X));
        connection.notify(ServerMessage::Waiting(WAITING_TEXT.to_string()));

        Self {
            game,
            mark: Mark::X,
            connection,
            state: SessionState::AwaitingPairing,
            shutdown,
        }
    }

    /// Join `game` as [`Mark::O`] and prompt the waiting peer to move.
    pub fn join(
        game: Arc<GameMatch>,
        connection: PeerConnection,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, JoinRejected> {
        let attached = game.attach_second(connection.outbox(), |own| {
            deliver(own, ServerMessage::Welcome(Mark::O));
        });
        let first = match attached {
            Ok(first) => first,
            Err(reason) => return Err(JoinRejected { reason, connection }),
        };
        deliver(&first, ServerMessage::Message(YOUR_MOVE_TEXT.to_string()));

        Ok(Self {
            game,
            mark: Mark::O,
            connection,
            state: SessionState::Playing,
            shutdown,
        })
    }

    /// The match this session plays in.
    pub fn game(&self) -> &Arc<GameMatch> {
        &self.game
    }

    /// Mark assigned to this peer.
    pub fn mark(&self) -> Mark {
        self.mark
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to completion, then clean up.
    pub async fn run(mut self) {
        match self.drive().await {
            Ok(SessionEnd::Quit) => tracing::info!("Peer quit"),
            Ok(SessionEnd::Shutdown) => tracing::info!("Closing for server shutdown"),
            Err(SessionError::Transport(FrameError::ConnectionClosed)) => {
                tracing::info!("Peer disconnected")
            }
            Err(SessionError::Protocol(e)) => tracing::warn!("Protocol error, closing: {e}"),
            Err(e) => tracing::warn!("Session failed: {e}"),
        }
        self.cleanup().await;
    }

    async fn drive(&mut self) -> Result<SessionEnd, SessionError> {
        let mut shutdown = self.shutdown.clone();

        if self.state == SessionState::AwaitingPairing {
            let mut paired = self.game.paired();
            loop {
                let command = tokio::select! {
                    () = wait_paired(&mut paired) => break,
                    command = self.connection.recv() => command?,
                    () = shutdown_requested(&mut shutdown) => return Ok(SessionEnd::Shutdown),
                };
                if let Some(end) = self.respond(command, &mut shutdown).await {
                    return Ok(end);
                }
            }
            self.transition(SessionState::Playing);
        }

        loop {
            let command = tokio::select! {
                command = self.connection.recv() => command?,
                () = shutdown_requested(&mut shutdown) => return Ok(SessionEnd::Shutdown),
            };
            if let Some(end) = self.respond(command, &mut shutdown).await {
                return Ok(end);
            }
        }
    }

    /// Handle one command. Replies can wait on a peer that is not reading,
    /// so shutdown is still observed meanwhile.
    async fn respond(
        &mut self,
        command: ClientCommand,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<SessionEnd> {
        tokio::select! {
            end = self.handle(command) => end,
            () = shutdown_requested(shutdown) => Some(SessionEnd::Shutdown),
        }
    }

    async fn handle(&mut self, command: ClientCommand) -> Option<SessionEnd> {
        match command {
            ClientCommand::Quit => Some(SessionEnd::Quit),
            ClientCommand::Move(cell) => {
                self.play(cell).await;
                None
            }
        }
    }

    async fn play(&mut self, cell: i32) {
        let accepted = match self.game.submit_move(self.mark, cell) {
            Ok(accepted) => accepted,
            Err(reason) => {
                tracing::debug!(cell, %reason, "Move rejected");
                self.follow_match();
                self.connection
                    .reply(ServerMessage::Message(reason.to_string()))
                    .await;
                return;
            }
        };
        tracing::debug!(cell = accepted.cell, "Move accepted");
        if accepted.ends_game() {
            tracing::info!(outcome = ?accepted.outcome, "Match finished");
        }
        self.follow_match();

        // The opponent is told first; our own replies may have to wait.
        let opponent = &accepted.opponent;
        match accepted.outcome {
            Outcome::Ongoing => deliver(opponent, ServerMessage::OpponentMoved(accepted.cell)),
            Outcome::Win(_) => {
                deliver(opponent, ServerMessage::OpponentMovedEnd(accepted.cell));
                deliver(opponent, ServerMessage::Defeat);
            }
            Outcome::Draw => {
                deliver(opponent, ServerMessage::OpponentMovedEnd(accepted.cell));
                deliver(opponent, ServerMessage::Tie);
            }
        }

        self.connection.reply(ServerMessage::ValidMove).await;
        match accepted.outcome {
            Outcome::Ongoing => {}
            Outcome::Win(_) => self.connection.reply(ServerMessage::Victory).await,
            Outcome::Draw => self.connection.reply(ServerMessage::Tie).await,
        }
    }

    /// Enter `Finished` once the match is over, whichever side ended it.
    fn follow_match(&mut self) {
        let over = matches!(self.game.phase(), Phase::Finished(_) | Phase::Abandoned);
        let live = matches!(
            self.state,
            SessionState::AwaitingPairing | SessionState::Playing
        );
        if over && live {
            self.transition(SessionState::Finished);
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "Session state changed");
        self.state = next;
    }

    async fn cleanup(mut self) {
        self.transition(SessionState::Closed);
        if let Some(opponent) = self.game.detach(self.mark) {
            tracing::info!("Notifying opponent that this peer left");
            deliver(&opponent, ServerMessage::OtherPlayerLeft);
        }
        self.connection.close().await;
        tracing::debug!("Session closed");
    }
}

/// Resolves once the match is paired. The sender lives in the match, which
/// the session keeps alive, so a closed channel only means "never".
async fn wait_paired(paired: &mut watch::Receiver<bool>) {
    if paired.wait_for(|paired| *paired).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves once the server asks sessions to stop. A dropped sender means
/// nobody can ask anymore.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
