//! Shared state of one match between two peers.
//!
//! A [`Match`] owns the board, the turn indicator, the pairing phase and one
//! peer handle per mark, all behind a single mutex. Every operation here is
//! computation-only: callers receive the handles they need to notify and do
//! the I/O after the lock is released, so a stalled peer can never block its
//! opponent's move validation.
//!
//! The handle type `P` is whatever the caller uses to reach a peer (the
//! server uses the sending side of the peer's outbox). Sessions never point
//! at each other; the opponent is always `mark.opponent()` resolved here.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tttp_protocol::Mark;

use crate::board::{Board, CELL_COUNT, Cell, Outcome};

/// Identifier of a match, unique within one coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchId(pub u64);

/// Pairing and termination state of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Only `X` is attached.
    WaitingForOpponent,
    /// Both peers attached, no terminal outcome yet.
    Playing,
    /// A move produced a terminal outcome.
    Finished(Outcome),
    /// A peer left before the game ended.
    Abandoned,
}

/// A rejected move. The display text is the reason sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// The game already ended or was abandoned.
    #[error("Game is over")]
    GameOver,
    /// The other mark holds the turn.
    #[error("Not your turn")]
    OutOfTurn,
    /// The second peer has not arrived.
    #[error("You don't have an opponent yet")]
    NoOpponent,
    /// The index is not in 0..=8.
    #[error("Cell out of range")]
    OutOfRange(i32),
    /// The cell is already claimed.
    #[error("Cell already occupied")]
    CellOccupied(usize),
}

/// Why a second peer could not join a pending match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    /// The waiting peer left before anyone joined.
    #[error("the waiting peer already left")]
    Abandoned,
    /// Both marks are already taken.
    #[error("match already has two peers")]
    AlreadyPaired,
}

/// An accepted move and what the caller must deliver.
#[derive(Debug, Clone)]
pub struct MoveAccepted<P> {
    /// Cell that was claimed.
    pub cell: usize,
    /// Outcome recomputed right after the move.
    pub outcome: Outcome,
    /// Handle of the opponent, to receive the move notification.
    pub opponent: P,
}

impl<P> MoveAccepted<P> {
    /// Whether this move ended the game. An outcome is only ever recomputed
    /// after a move, so a terminal outcome is always caused by this move.
    pub fn ends_game(&self) -> bool {
        self.outcome.is_terminal()
    }
}

struct MatchState<P> {
    board: Board,
    turn: Mark,
    phase: Phase,
    peers: [Option<P>; 2],
}

impl<P> MatchState<P> {
    fn peer(&self, mark: Mark) -> &Option<P> {
        &self.peers[slot(mark)]
    }

    fn peer_mut(&mut self, mark: Mark) -> &mut Option<P> {
        &mut self.peers[slot(mark)]
    }
}

fn slot(mark: Mark) -> usize {
    match mark {
        Mark::X => 0,
        Mark::O => 1,
    }
}

/// One game instance binding exactly two peers.
pub struct Match<P> {
    id: MatchId,
    state: Mutex<MatchState<P>>,
    paired_tx: watch::Sender<bool>,
}

impl<P: Clone> Match<P> {
    /// Create a match with `first` attached as [`Mark::X`], which moves first.
    pub fn new(id: MatchId, first: P) -> Self {
        let (paired_tx, _) = watch::channel(false);
        Self {
            id,
            state: Mutex::new(MatchState {
                board: Board::new(),
                turn: Mark::X,
                phase: Phase::WaitingForOpponent,
                peers: [Some(first), None],
            }),
            paired_tx,
        }
    }

    /// This match's identifier.
    pub fn id(&self) -> MatchId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, MatchState<P>> {
        // No operation panics halfway through a mutation, so a poisoned
        // state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `second` as [`Mark::O`] and start play. Returns the handle of
    /// the waiting `X` peer so the caller can prompt its first move.
    ///
    /// `announce` runs only when the attach succeeds, before the opponent can
    /// see the new peer. Whatever it queues on `second` is therefore queued
    /// ahead of any move notification. It must not block.
    pub fn attach_second<F>(&self, second: P, announce: F) -> Result<P, PairingError>
    where
        F: FnOnce(&P),
    {
        let mut state = self.lock();
        match state.phase {
            Phase::WaitingForOpponent => {}
            Phase::Abandoned => return Err(PairingError::Abandoned),
            Phase::Playing | Phase::Finished(_) => return Err(PairingError::AlreadyPaired),
        }
        let Some(first) = state.peer(Mark::X).clone() else {
            return Err(PairingError::Abandoned);
        };
        announce(&second);
        *state.peer_mut(Mark::O) = Some(second);
        state.phase = Phase::Playing;
        drop(state);

        self.paired_tx.send_replace(true);
        tracing::debug!(match_id = self.id.0, "match paired");
        Ok(first)
    }

    /// Receiver that turns `true` once the second peer has attached.
    pub fn paired(&self) -> watch::Receiver<bool> {
        self.paired_tx.subscribe()
    }

    /// Validate and apply a move by `mark` on `cell`.
    ///
    /// Checks, in order: the game is still live, `mark` holds the turn, an
    /// opponent is attached, the cell is on the board and empty. A rejected
    /// move leaves the match untouched.
    pub fn submit_move(&self, mark: Mark, cell: i32) -> Result<MoveAccepted<P>, MoveError> {
        let mut state = self.lock();

        if matches!(state.phase, Phase::Finished(_) | Phase::Abandoned) {
            return Err(MoveError::GameOver);
        }
        if state.turn != mark {
            return Err(MoveError::OutOfTurn);
        }
        let Some(opponent) = state.peer(mark.opponent()).clone() else {
            return Err(MoveError::NoOpponent);
        };
        let index = usize::try_from(cell)
            .ok()
            .filter(|i| *i < CELL_COUNT)
            .ok_or(MoveError::OutOfRange(cell))?;
        if state.board.get(index) != Some(Cell::Empty) {
            return Err(MoveError::CellOccupied(index));
        }

        state.board.set(index, mark);
        state.turn = mark.opponent();
        let outcome = state.board.outcome();
        if outcome.is_terminal() {
            state.phase = Phase::Finished(outcome);
        }

        Ok(MoveAccepted {
            cell: index,
            outcome,
            opponent,
        })
    }

    /// Detach the peer playing `mark`.
    ///
    /// Returns the opponent's handle when the opponent is still attached and
    /// the game had not ended, meaning the caller owes it an
    /// `OTHER_PLAYER_LEFT`. Leaving a live game abandons it. Calling this
    /// twice for the same mark returns `None` the second time.
    pub fn detach(&self, mark: Mark) -> Option<P> {
        let mut state = self.lock();
        state.peer_mut(mark).take()?;

        match state.phase {
            Phase::WaitingForOpponent => {
                state.phase = Phase::Abandoned;
                None
            }
            Phase::Playing => {
                state.phase = Phase::Abandoned;
                state.peer(mark.opponent()).clone()
            }
            Phase::Finished(_) | Phase::Abandoned => None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Mark that moves next.
    pub fn turn(&self) -> Mark {
        self.lock().turn
    }

    /// Copy of the current board.
    pub fn board(&self) -> Board {
        self.lock().board.clone()
    }

    /// Whether the peer playing `mark` is still attached.
    pub fn is_attached(&self, mark: Mark) -> bool {
        self.lock().peer(mark).is_some()
    }
}
