//! Error types for the room server.

use derive_more::{Display, Error};
use duel_tictactoe::BoardError;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Why a client request was refused.
///
/// Every variant except `ResourceExhausted` is caused by client input and
/// leaves session state unchanged. Serialized as a kebab-case code in the
/// `reason` field of a `rejected` event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    Error,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SessionError {
    /// No session exists under the given identifier.
    #[display("Game not found")]
    SessionNotFound,

    /// The session already has two participants.
    #[display("Game already has two players")]
    SessionFull,

    /// The mover's mark is not the active turn.
    #[display("It is not your turn")]
    NotYourTurn,

    /// The target cell already holds a mark.
    #[display("That cell is already taken")]
    CellOccupied,

    /// The cell index is outside 0-8.
    #[display("Cell index must be between 0 and 8")]
    InvalidIndex,

    /// The session is waiting for an opponent or already finished.
    #[display("Game is not in progress")]
    GameNotActive,

    /// The connection already sits in this session.
    #[display("You have already joined this game")]
    AlreadyJoined,

    /// The connection is not seated in the session it addressed.
    #[display("You are not a player in this game")]
    NotAParticipant,

    /// The frame could not be parsed as a client event.
    #[display("Malformed message")]
    MalformedMessage,

    /// No free session identifier could be found.
    #[display("No free game identifier available")]
    ResourceExhausted,
}

impl SessionError {
    /// Wire code for this error, e.g. `not-your-turn`.
    pub fn code(self) -> &'static str {
        self.into()
    }

    /// True for errors caused by the client rather than the server.
    pub fn is_client_error(self) -> bool {
        !matches!(self, SessionError::ResourceExhausted)
    }
}

impl From<BoardError> for SessionError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::IndexOutOfRange(_) => SessionError::InvalidIndex,
            BoardError::CellOccupied(_) => SessionError::CellOccupied,
        }
    }
}

/// Configuration error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error at the caller's location.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
