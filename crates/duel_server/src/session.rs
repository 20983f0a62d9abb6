//! Per-session state machine: waiting, playing, finished.

use crate::error::SessionError;
use crate::ids::{ConnectionId, SessionId};
use derive_new::new;
use duel_tictactoe::{Board, Mark};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    /// Fewer than two participants.
    Waiting,
    /// Two participants, moves accepted.
    Playing,
    /// Won or drawn; only reset leaves this state.
    Finished,
}

/// Terminal result of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Three in a row for this mark.
    Winner(Mark),
    /// Full board, no line.
    Draw,
}

/// What an accepted move did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Game goes on; `next` is to move.
    Continue {
        /// Mark whose turn it now is.
        next: Mark,
    },
    /// The move completed a line.
    Won {
        /// Mark that completed the line.
        winner: Mark,
    },
    /// The move filled the last cell without a line.
    Draw,
}

/// Result of a participant leaving a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The handle was not seated here.
    NotParticipant,
    /// No connected participant remains; the session should be dropped.
    Abandoned,
    /// These participants are still connected.
    OpponentRemains(Vec<ConnectionId>),
}

/// A seat in a session.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Participant {
    connection: ConnectionId,
    mark: Mark,
    #[new(value = "true")]
    connected: bool,
}

impl Participant {
    /// Connection holding this seat.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Mark assigned to this seat.
    pub fn mark(&self) -> Mark {
        self.mark
    }

    /// Whether the seat's connection is still live.
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// One game between at most two connections.
///
/// Invariants: at most two participants with distinct marks; `Waiting` iff
/// fewer than two participants; `Finished` iff an outcome is recorded.
/// Participants are never unseated, so the mapping holds everyone who ever
/// joined; disconnects only clear the `connected` flag.
#[derive(Debug, Clone)]
pub struct GameSession {
    id: SessionId,
    board: Board,
    turn: Mark,
    participants: Vec<Participant>,
    status: SessionStatus,
    outcome: Option<Outcome>,
    closed: bool,
}

impl GameSession {
    /// Creates an empty session waiting for its creator.
    #[instrument]
    pub fn new(id: SessionId) -> Self {
        debug!(session_id = %id, "Creating game session");
        Self {
            id,
            board: Board::new(),
            turn: Mark::X,
            participants: Vec::with_capacity(2),
            status: SessionStatus::Waiting,
            outcome: None,
            closed: false,
        }
    }

    /// Creates a session with `creator` seated as `X`.
    pub fn with_creator(id: SessionId, creator: ConnectionId) -> Self {
        let mut session = Self::new(id);
        session.participants.push(Participant::new(creator, Mark::X));
        session
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mark whose turn it is.
    pub fn turn(&self) -> Mark {
        self.turn
    }

    /// Lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Recorded outcome, `None` unless finished.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Everyone who ever joined.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Number of ever-joined participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Mark assigned to `handle`, if seated.
    pub fn mark_of(&self, handle: ConnectionId) -> Option<Mark> {
        self.participant(handle).map(Participant::mark)
    }

    /// Handles that receive this session's broadcasts.
    pub fn subscribers(&self) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .filter(|p| p.connected)
            .map(Participant::connection)
            .collect()
    }

    /// True once the registry has dropped this session.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    fn participant(&self, handle: ConnectionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.connection == handle)
    }

    /// Checks whether `handle` could take the `O` seat right now.
    pub fn can_join(&self, handle: ConnectionId) -> Result<(), SessionError> {
        // A session whose creator already left is as good as gone.
        if self.closed || !self.participants.iter().any(|p| p.connected) {
            return Err(SessionError::SessionNotFound);
        }
        if self.participant(handle).is_some() {
            warn!(connection_id = %handle, "Connection already seated");
            return Err(SessionError::AlreadyJoined);
        }
        if self.participants.len() >= 2 {
            warn!(connection_id = %handle, "Session already has 2 players");
            return Err(SessionError::SessionFull);
        }
        if self.status != SessionStatus::Waiting {
            return Err(SessionError::GameNotActive);
        }
        Ok(())
    }

    /// Seats `handle` as `O` and starts the game.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn join(&mut self, handle: ConnectionId) -> Result<Mark, SessionError> {
        self.can_join(handle)?;

        let mark = Mark::O;
        self.participants.push(Participant::new(handle, mark));
        self.status = SessionStatus::Playing;
        info!(connection_id = %handle, %mark, "Opponent joined");
        Ok(mark)
    }

    /// Applies a move by `handle` at `index`.
    ///
    /// Checks, in order: seated, playing, index in range, turn, empty cell.
    /// Any failure leaves the session untouched.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn apply_move(
        &mut self,
        handle: ConnectionId,
        index: usize,
    ) -> Result<MoveOutcome, SessionError> {
        if self.closed {
            return Err(SessionError::SessionNotFound);
        }
        let mark = self
            .mark_of(handle)
            .ok_or(SessionError::NotAParticipant)?;

        if self.status != SessionStatus::Playing {
            debug!(status = %self.status, "Move outside of play");
            return Err(SessionError::GameNotActive);
        }
        if index >= duel_tictactoe::CELLS {
            return Err(SessionError::InvalidIndex);
        }
        if mark != self.turn {
            warn!(%mark, turn = %self.turn, "Move out of turn");
            return Err(SessionError::NotYourTurn);
        }

        self.board = self.board.apply(index, mark)?;

        let outcome = if let Some(winner) = self.board.winner() {
            self.finish(Outcome::Winner(winner));
            MoveOutcome::Won { winner }
        } else if self.board.is_full() {
            self.finish(Outcome::Draw);
            MoveOutcome::Draw
        } else {
            self.turn = mark.opponent();
            MoveOutcome::Continue { next: self.turn }
        };

        info!(%mark, index, ?outcome, "Move applied");
        debug!(board = %self.board.display(), "Board after move");
        Ok(outcome)
    }

    fn finish(&mut self, outcome: Outcome) {
        self.status = SessionStatus::Finished;
        self.outcome = Some(outcome);
    }

    /// Clears the board and starts a fresh game with `X` to move.
    ///
    /// Only seated participants may reset, and only once both seats are
    /// taken: a waiting session has nothing to reset.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn reset(&mut self, handle: ConnectionId) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::SessionNotFound);
        }
        if self.participant(handle).is_none() {
            return Err(SessionError::NotAParticipant);
        }
        if self.status == SessionStatus::Waiting {
            return Err(SessionError::GameNotActive);
        }

        self.board = Board::new();
        self.turn = Mark::X;
        self.outcome = None;
        self.status = SessionStatus::Playing;
        info!("Game reset");
        Ok(())
    }

    /// Marks `handle` as disconnected.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn leave(&mut self, handle: ConnectionId) -> Departure {
        let Some(seat) = self.participants.iter_mut().find(|p| p.connection == handle) else {
            return Departure::NotParticipant;
        };
        seat.connected = false;

        let remaining = self.subscribers();
        if remaining.is_empty() {
            info!("Last participant left");
            Departure::Abandoned
        } else {
            info!(remaining = remaining.len(), "Participant left");
            Departure::OpponentRemains(remaining)
        }
    }
}
