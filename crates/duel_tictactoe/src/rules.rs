//! Move application, win and draw detection.

use super::error::BoardError;
use super::types::{Board, CELLS, Mark, Square};
use tracing::instrument;

/// Winning triples, scanned in this order: rows, columns, diagonals.
pub const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

impl Board {
    /// Returns a copy of the board with `mark` placed at `index`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` when `index >= 9`, `CellOccupied` when the cell
    /// already holds a mark. The original board is untouched either way.
    #[instrument(skip(self))]
    pub fn apply(&self, index: usize, mark: Mark) -> Result<Board, BoardError> {
        let mut next = self.clone();
        next.place(index, mark)?;
        Ok(next)
    }

    /// Places `mark` at `index` in place, with the same checks as [`Board::apply`].
    #[instrument(skip(self))]
    pub fn place(&mut self, index: usize, mark: Mark) -> Result<(), BoardError> {
        if index >= CELLS {
            return Err(BoardError::IndexOutOfRange(index));
        }
        let cell = &mut self.squares_mut()[index];
        if *cell != Square::Empty {
            return Err(BoardError::CellOccupied(index));
        }
        *cell = Square::Occupied(mark);
        Ok(())
    }

    /// Returns the mark holding a complete line, if any.
    ///
    /// Lines are checked rows first, then columns, then diagonals, and the
    /// first match wins.
    pub fn winner(&self) -> Option<Mark> {
        let squares = self.squares();
        LINES.iter().find_map(|&[a, b, c]| match squares[a] {
            Square::Occupied(mark) if squares[b] == squares[a] && squares[c] == squares[a] => {
                Some(mark)
            }
            _ => None,
        })
    }

    /// True iff no cell is empty.
    pub fn is_full(&self) -> bool {
        self.squares().iter().all(|s| *s != Square::Empty)
    }
}
