//! Core domain types for the board engine.

use serde::{Deserialize, Serialize};

/// Number of cells on the board.
pub const CELLS: usize = 9;

/// A participant's mark.
///
/// The session creator always plays `X` and moves first; the joiner plays `O`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum Mark {
    /// First participant (session creator).
    X,
    /// Second participant (joiner).
    O,
}

impl Mark {
    /// Returns the opposing mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// A single cell on the board.
///
/// Serialized as `null` when empty and as the mark otherwise, which is the
/// shape clients render directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<Mark>", into = "Option<Mark>")]
pub enum Square {
    /// Nobody has played here yet.
    #[default]
    Empty,
    /// Cell claimed by a mark.
    Occupied(Mark),
}

impl Square {
    /// Returns the mark in this cell, if any.
    pub fn mark(self) -> Option<Mark> {
        match self {
            Square::Empty => None,
            Square::Occupied(mark) => Some(mark),
        }
    }
}

impl From<Option<Mark>> for Square {
    fn from(value: Option<Mark>) -> Self {
        value.map_or(Square::Empty, Square::Occupied)
    }
}

impl From<Square> for Option<Mark> {
    fn from(value: Square) -> Self {
        value.mark()
    }
}

/// 3x3 board in row-major order (cells 0-8).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    squares: [Square; CELLS],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the square at `index`, or `None` when out of range.
    pub fn get(&self, index: usize) -> Option<Square> {
        self.squares.get(index).copied()
    }

    /// Checks if the cell at `index` exists and is empty.
    pub fn is_empty(&self, index: usize) -> bool {
        matches!(self.get(index), Some(Square::Empty))
    }

    /// Returns all squares.
    pub fn squares(&self) -> &[Square; CELLS] {
        &self.squares
    }

    /// Number of occupied cells.
    pub fn occupied(&self) -> usize {
        self.squares
            .iter()
            .filter(|s| **s != Square::Empty)
            .count()
    }

    pub(crate) fn squares_mut(&mut self) -> &mut [Square; CELLS] {
        &mut self.squares
    }

    /// Formats the board as a small ASCII grid for logs.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let index = row * 3 + col;
                let symbol = match self.squares[index] {
                    Square::Empty => (index + 1).to_string(),
                    Square::Occupied(mark) => mark.to_string(),
                };
                result.push_str(&symbol);
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

impl From<[Square; CELLS]> for Board {
    fn from(squares: [Square; CELLS]) -> Self {
        Self { squares }
    }
}
