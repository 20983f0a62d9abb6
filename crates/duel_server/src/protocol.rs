//! Wire events exchanged over the WebSocket.
//!
//! Frames are JSON objects tagged by `event` with kebab-case event names and
//! camelCase fields, e.g. `{"event":"make-move","gameId":"k3x9a","index":4}`.

use crate::error::SessionError;
use crate::ids::SessionId;
use duel_tictactoe::{Board, Mark};
use serde::{Deserialize, Serialize};

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Open a new session and take the `X` seat.
    CreateGame,
    /// Take the `O` seat in an existing session.
    JoinGame {
        /// Session to join.
        game_id: SessionId,
    },
    /// Place a mark.
    MakeMove {
        /// Session the move is for.
        game_id: SessionId,
        /// Cell index, 0-8.
        index: usize,
        /// Mark the client believes it holds. Never trusted; the server
        /// uses the seat recorded for the connection.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbol: Option<Mark>,
    },
    /// Start the game over.
    ResetGame {
        /// Session to reset.
        game_id: SessionId,
    },
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Sent to the creator only.
    GameCreated {
        /// New session identifier.
        game_id: SessionId,
        /// Seat taken by the creator.
        symbol: Mark,
    },
    /// Sent to the joiner only.
    GameJoined {
        /// Joined session identifier.
        game_id: SessionId,
        /// Seat taken by the joiner.
        symbol: Mark,
    },
    /// Both seats are taken.
    OpponentJoined,
    /// Board after an accepted move.
    BoardUpdated {
        /// All nine cells.
        board: Board,
        /// Mark to move next; the mover itself when the game just ended.
        current_player: Mark,
    },
    /// Game ended with a line.
    GameWon {
        /// Mark that won.
        winner: Mark,
    },
    /// Game ended with a full board.
    GameDraw,
    /// Board cleared, `X` to move.
    GameReset,
    /// The other participant disconnected.
    OpponentLeft,
    /// Sent to the originating connection only.
    Rejected {
        /// Machine-readable reason.
        reason: SessionError,
        /// Human-readable explanation.
        message: String,
    },
}

impl ServerEvent {
    /// Builds the rejection event for `err`.
    pub fn rejected(err: SessionError) -> Self {
        ServerEvent::Rejected {
            reason: err,
            message: err.to_string(),
        }
    }

    /// Wire name of this event, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::GameCreated { .. } => "game-created",
            ServerEvent::GameJoined { .. } => "game-joined",
            ServerEvent::OpponentJoined => "opponent-joined",
            ServerEvent::BoardUpdated { .. } => "board-updated",
            ServerEvent::GameWon { .. } => "game-won",
            ServerEvent::GameDraw => "game-draw",
            ServerEvent::GameReset => "game-reset",
            ServerEvent::OpponentLeft => "opponent-left",
            ServerEvent::Rejected { .. } => "rejected",
        }
    }
}
