//! Board engine errors.

use derive_more::{Display, Error};

/// A write the board refuses to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum BoardError {
    /// Index is not in `0..9`.
    #[display("Cell index {_0} is out of range (must be 0-8)")]
    IndexOutOfRange(#[error(not(source))] usize),

    /// Cell already holds a mark.
    #[display("Cell {_0} is already occupied")]
    CellOccupied(#[error(not(source))] usize),
}
