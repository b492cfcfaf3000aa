//! Tic-tac-toe match state: the board, outcome detection, and the shared
//! per-match turn arbiter that serialises moves from two peers.

pub mod board;
pub mod match_state;

pub use board::{Board, CELL_COUNT, Cell, Outcome};
pub use match_state::{Match, MatchId, MoveAccepted, MoveError, PairingError, Phase};
pub use tttp_protocol::Mark;
