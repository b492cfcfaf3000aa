//! Player marks shared by the wire vocabulary and the game state.

use std::fmt;
use std::str::FromStr;

/// The symbol identifying which peer owns a cell.
///
/// The first connection of a match plays [`Mark::X`] and moves first; the
/// second plays [`Mark::O`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    /// First peer of a match.
    X,
    /// Second peer of a match.
    O,
}

impl Mark {
    /// The mark of the other peer in the same match.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Single-character wire representation.
    pub fn as_char(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Error returned when text is not a single `X` or `O`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid mark {0:?}")]
pub struct InvalidMark(pub String);

impl FromStr for Mark {
    type Err = InvalidMark;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" => Ok(Mark::X),
            "O" => Ok(Mark::O),
            other => Err(InvalidMark(other.to_string())),
        }
    }
}
