//! Board engine for two-player tic-tac-toe rooms.
//!
//! Pure logic, no I/O: a 3x3 board, move validation, and win/draw
//! detection. The server crate layers sessions and turn arbitration on top.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod rules;
mod types;

pub use error::BoardError;
pub use rules::LINES;
pub use types::{Board, CELLS, Mark, Square};
