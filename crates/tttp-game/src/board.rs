//! The 3×3 board and the pure outcome computation over it.

use std::fmt;

use tttp_protocol::Mark;

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// The 8 winning lines: 3 rows, 3 columns, 2 diagonals.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Content of one board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    /// Nobody has played here.
    #[default]
    Empty,
    /// Claimed by a mark.
    Marked(Mark),
}

/// Status of a game, derived from the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No winning line and at least one empty cell.
    Ongoing,
    /// The mark owns a complete line.
    Win(Mark),
    /// Every cell is claimed and no line is complete.
    Draw,
}

impl Outcome {
    /// Whether the game is over.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }
}

/// Nine cells indexed 0..8, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Board {
    cells: [Cell; CELL_COUNT],
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// All cells in index order.
    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.cells
    }

    /// The cell at `index`, or `None` when off the board.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// Claim `index` for `mark`. The caller has already checked that the
    /// index is on the board and the cell is empty.
    pub(crate) fn set(&mut self, index: usize, mark: Mark) {
        self.cells[index] = Cell::Marked(mark);
    }

    /// Whether every cell is claimed.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| *c != Cell::Empty)
    }

    /// Compute the outcome. A complete line wins even on a full board.
    pub fn outcome(&self) -> Outcome {
        for [a, b, c] in LINES {
            if let Cell::Marked(mark) = self.cells[a]
                && self.cells[b] == self.cells[a]
                && self.cells[c] == self.cells[a]
            {
                return Outcome::Win(mark);
            }
        }
        if self.is_full() {
            Outcome::Draw
        } else {
            Outcome::Ongoing
        }
    }
}

impl FromIterator<Cell> for Board {
    /// Build a board from up to 9 cells; missing cells stay empty.
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        let mut board = Board::new();
        for (slot, cell) in board.cells.iter_mut().zip(iter) {
            *slot = cell;
        }
        board
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.cells.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f, "---------")?;
            }
            let line: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(col, cell)| match cell {
                    Cell::Empty => (row * 3 + col).to_string(),
                    Cell::Marked(mark) => mark.to_string(),
                })
                .collect();
            writeln!(f, "{}", line.join(" | "))?;
        }
        Ok(())
    }
}
