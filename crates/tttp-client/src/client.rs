//! Client side of a TTTP match.
//!
//! [`TttpClient`] reads server messages, mirrors the board locally, and
//! drives two collaborators: a [`MoveSource`] that picks the local player's
//! cells and a [`BoardRender`] that shows the board and status lines.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tttp_game::{Board, CELL_COUNT, Cell};
use tttp_protocol::{
    ClientCommand, FrameConfig, FrameError, Mark, ProtocolError, ServerMessage, read_frame,
    write_frame,
};

/// Yields the local player's next cell.
pub trait MoveSource {
    /// Pick a cell given the current board. `None` gives up the game.
    fn next_move(&mut self, board: &Board) -> impl Future<Output = Option<i32>>;
}

/// Displays the game to the local player.
pub trait BoardRender {
    /// Show the current board.
    fn render(&mut self, board: &Board);

    /// Show one line of status text.
    fn status(&mut self, text: &str);
}

/// How a game ended for the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Victory,
    Defeat,
    Tie,
    /// The opponent disconnected first.
    OpponentLeft,
    /// The move source gave up.
    Quit,
}

/// Errors that end a client session.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("bad server message: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("expected WELCOME, server sent {0}")]
    NotWelcomed(String),
    #[error("server reported cell {0}, which is off the board")]
    CellOutOfRange(usize),
}

/// A connection to a TTTP server.
pub struct TttpClient<S = TcpStream> {
    stream: S,
    frame: FrameConfig,
    mark: Option<Mark>,
    cells: [Cell; CELL_COUNT],
    pending_move: Option<i32>,
}

impl TttpClient<TcpStream> {
    /// Connect to `endpoint` (`host:port`).
    pub async fn connect(endpoint: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|source| ClientError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("TCP_NODELAY failed: {e}");
        }
        tracing::info!("Connected to {endpoint}");
        Ok(Self::new(stream))
    }
}

impl<S> TttpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            frame: FrameConfig::default(),
            mark: None,
            cells: [Cell::Empty; CELL_COUNT],
            pending_move: None,
        }
    }

    /// Mark assigned by the server, once welcomed.
    pub fn mark(&self) -> Option<Mark> {
        self.mark
    }

    /// The local copy of the board.
    pub fn board(&self) -> Board {
        self.cells.iter().copied().collect()
    }

    /// Play one game to its end, then send `QUIT` and close the stream.
    pub async fn play<M, R>(&mut self, moves: &mut M, render: &mut R) -> Result<GameResult, ClientError>
    where
        M: MoveSource,
        R: BoardRender,
    {
        let result = self.run_game(moves, render).await;

        if let Err(e) = self.send(ClientCommand::Quit).await {
            tracing::debug!("Could not send QUIT: {e}");
        }
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Shutdown failed: {e}");
        }
        result
    }

    async fn run_game<M, R>(&mut self, moves: &mut M, render: &mut R) -> Result<GameResult, ClientError>
    where
        M: MoveSource,
        R: BoardRender,
    {
        let mark = match self.recv().await? {
            ServerMessage::Welcome(mark) => mark,
            other => return Err(ClientError::NotWelcomed(other.to_string())),
        };
        self.mark = Some(mark);
        render.status(&format!("You play {mark}"));
        render.render(&self.board());

        loop {
            match self.recv().await? {
                ServerMessage::Welcome(again) => {
                    tracing::warn!("Ignoring repeated WELCOME {again}");
                }
                ServerMessage::Waiting(text) => render.status(&text),
                ServerMessage::Message(text) => {
                    render.status(&text);
                    if !self.prompt(moves).await? {
                        return Ok(GameResult::Quit);
                    }
                }
                ServerMessage::ValidMove => {
                    if let Some(cell) = self.pending_move.take() {
                        let cell = usize::try_from(cell).unwrap_or(CELL_COUNT);
                        self.claim(cell, mark)?;
                    }
                    render.render(&self.board());
                    render.status("Valid move, please wait");
                }
                ServerMessage::OpponentMoved(cell) => {
                    self.claim(cell, mark.opponent())?;
                    render.render(&self.board());
                    render.status(&format!("Opponent moved {cell}, your turn"));
                    if !self.prompt(moves).await? {
                        return Ok(GameResult::Quit);
                    }
                }
                ServerMessage::OpponentMovedEnd(cell) => {
                    self.claim(cell, mark.opponent())?;
                    render.render(&self.board());
                    render.status(&format!("Opponent moved {cell}"));
                }
                ServerMessage::Victory => {
                    render.status("You win");
                    return Ok(GameResult::Victory);
                }
                ServerMessage::Defeat => {
                    render.status("You lose");
                    return Ok(GameResult::Defeat);
                }
                ServerMessage::Tie => {
                    render.status("Tie");
                    return Ok(GameResult::Tie);
                }
                ServerMessage::OtherPlayerLeft => {
                    render.status("Other player left");
                    return Ok(GameResult::OpponentLeft);
                }
            }
        }
    }

    /// Ask the move source for a cell and submit it. `false` when it gave up.
    async fn prompt<M: MoveSource>(&mut self, moves: &mut M) -> Result<bool, ClientError> {
        let board = self.board();
        let Some(cell) = moves.next_move(&board).await else {
            return Ok(false);
        };
        self.pending_move = Some(cell);
        self.send(ClientCommand::Move(cell)).await?;
        Ok(true)
    }

    fn claim(&mut self, cell: usize, mark: Mark) -> Result<(), ClientError> {
        let slot = self
            .cells
            .get_mut(cell)
            .ok_or(ClientError::CellOutOfRange(cell))?;
        *slot = Cell::Marked(mark);
        Ok(())
    }

    async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        let line = read_frame(&mut self.stream, &self.frame).await?;
        tracing::trace!("Received {line}");
        Ok(line.parse()?)
    }

    async fn send(&mut self, command: ClientCommand) -> Result<(), ClientError> {
        write_frame(&mut self.stream, &command.to_string(), &self.frame).await?;
        Ok(())
    }
}
