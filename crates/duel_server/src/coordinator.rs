//! Routes client events to sessions and fans results out to subscribers.

use crate::error::SessionError;
use crate::ids::{ConnectionId, SessionId};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::registry::SessionRegistry;
use crate::session::{Departure, GameSession, MoveOutcome};
use dashmap::DashMap;
use duel_tictactoe::Mark;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_SEND_QUEUE: usize = 64;

/// A live connection as seen by the coordinator.
#[derive(Debug)]
struct Connection {
    tx: mpsc::Sender<ServerEvent>,
    session: Option<SessionId>,
}

/// Connection coordinator.
///
/// Owns the handle → session reverse index and the outbound queue of every
/// live connection. Every broadcast for a session is enqueued while that
/// session's lock is held, so subscribers see events in transition order.
#[derive(Debug)]
pub struct Coordinator {
    registry: SessionRegistry,
    connections: DashMap<ConnectionId, Connection>,
    send_queue: usize,
}

impl Coordinator {
    /// Creates a coordinator over `registry`.
    #[instrument(skip(registry))]
    pub fn new(registry: SessionRegistry, send_queue: usize) -> Self {
        info!(send_queue, "Creating connection coordinator");
        Self {
            registry,
            connections: DashMap::new(),
            send_queue: send_queue.max(1),
        }
    }

    /// The session registry this coordinator routes into.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Registers a new connection and returns its handle and outbound queue.
    #[instrument(skip(self))]
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.send_queue);
        self.connections.insert(id, Connection { tx, session: None });
        info!(connection_id = %id, "Connection registered");
        (id, rx)
    }

    /// Session the connection currently sits in.
    pub fn session_of(&self, handle: ConnectionId) -> Option<SessionId> {
        self.connections
            .get(&handle)
            .and_then(|conn| conn.session.clone())
    }

    /// Dispatches one client event; rejections go back to `handle` only.
    #[instrument(skip(self, event), fields(connection_id = %handle))]
    pub async fn handle(&self, handle: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::CreateGame => self.on_create(handle).await.map(|_| ()),
            ClientEvent::JoinGame { game_id } => self.on_join(handle, &game_id).await.map(|_| ()),
            ClientEvent::MakeMove {
                game_id,
                index,
                symbol,
            } => self.on_move(handle, &game_id, index, symbol).await.map(|_| ()),
            ClientEvent::ResetGame { game_id } => self.on_reset(handle, &game_id).await,
        };

        if let Err(err) = result {
            self.reject(handle, err);
        }
    }

    /// Answers a request with a rejection.
    pub fn reject(&self, handle: ConnectionId, err: SessionError) {
        if err.is_client_error() {
            debug!(connection_id = %handle, reason = err.code(), "Request rejected");
        } else {
            error!(connection_id = %handle, reason = err.code(), "Request failed");
        }
        self.send_to(handle, ServerEvent::rejected(err));
    }

    /// Opens a session with `handle` as `X`.
    ///
    /// A connection sits in at most one session, so any previous one is
    /// left first.
    #[instrument(skip(self), fields(connection_id = %handle))]
    pub async fn on_create(&self, handle: ConnectionId) -> Result<SessionId, SessionError> {
        self.detach(handle).await;

        let (id, session) = self.registry.create(handle)?;
        let mut session = session.lock().await;

        if !self.bind(handle, &id) {
            debug!(session_id = %id, "Creator vanished before the session was bound");
            self.registry.delete_locked(&mut session);
            return Ok(id);
        }

        self.send_to(
            handle,
            ServerEvent::GameCreated {
                game_id: id.clone(),
                symbol: Mark::X,
            },
        );
        info!(session_id = %id, "Game created");
        Ok(id)
    }

    /// Seats `handle` as `O` in session `id`.
    ///
    /// Joining and leaving the caller's current session happen under both
    /// sessions' locks, so a failed join keeps the caller's current seat.
    #[instrument(skip(self), fields(connection_id = %handle, session_id = %id))]
    pub async fn on_join(&self, handle: ConnectionId, id: &SessionId) -> Result<Mark, SessionError> {
        let target = self.registry.get(id).ok_or(SessionError::SessionNotFound)?;
        let current = self.session_of(handle);
        if current.as_ref() == Some(id) {
            return Err(SessionError::AlreadyJoined);
        }
        let previous = current.and_then(|prev| self.registry.get(&prev).map(|h| (prev, h)));

        // Two locks at most, always taken in identifier order.
        let (mut session, mut left) = match &previous {
            None => (target.lock().await, None),
            Some((prev_id, prev)) if prev_id < id => {
                let left = prev.lock().await;
                (target.lock().await, Some(left))
            }
            Some((_, prev)) => {
                let session = target.lock().await;
                (session, Some(prev.lock().await))
            }
        };

        let mark = session.join(handle)?;
        if let Some(left) = left.as_deref_mut() {
            debug!(session_id = %left.id(), "Leaving previous session");
            self.depart(left, handle);
        }
        drop(left);

        if !self.bind(handle, id) {
            debug!("Joiner vanished before the session was bound");
            self.depart(&mut session, handle);
            return Ok(mark);
        }

        self.send_to(
            handle,
            ServerEvent::GameJoined {
                game_id: id.clone(),
                symbol: mark,
            },
        );
        self.broadcast(&session, ServerEvent::OpponentJoined);
        info!("Player joined game");
        Ok(mark)
    }

    /// Applies a move for `handle`.
    ///
    /// The acting mark comes from the seat recorded for `handle`; a claimed
    /// symbol in the request is only compared for logging.
    #[instrument(skip(self), fields(connection_id = %handle, session_id = %id))]
    pub async fn on_move(
        &self,
        handle: ConnectionId,
        id: &SessionId,
        index: usize,
        claimed: Option<Mark>,
    ) -> Result<MoveOutcome, SessionError> {
        let session = self.registry.get(id).ok_or(SessionError::SessionNotFound)?;
        let mut session = session.lock().await;

        if let (Some(claimed), Some(seated)) = (claimed, session.mark_of(handle)) {
            if claimed != seated {
                warn!(%claimed, %seated, "Client claimed a mark it does not hold");
            }
        }

        let outcome = session.apply_move(handle, index)?;
        let board = session.board().clone();

        match outcome {
            MoveOutcome::Continue { next } => {
                self.broadcast(
                    &session,
                    ServerEvent::BoardUpdated {
                        board,
                        current_player: next,
                    },
                );
            }
            MoveOutcome::Won { winner } => {
                self.broadcast(
                    &session,
                    ServerEvent::BoardUpdated {
                        board,
                        current_player: winner,
                    },
                );
                self.broadcast(&session, ServerEvent::GameWon { winner });
                info!(%winner, "Game won");
            }
            MoveOutcome::Draw => {
                self.broadcast(
                    &session,
                    ServerEvent::BoardUpdated {
                        board,
                        current_player: session.turn(),
                    },
                );
                self.broadcast(&session, ServerEvent::GameDraw);
                info!("Game is a draw");
            }
        }

        Ok(outcome)
    }

    /// Starts the game in session `id` over.
    #[instrument(skip(self), fields(connection_id = %handle, session_id = %id))]
    pub async fn on_reset(&self, handle: ConnectionId, id: &SessionId) -> Result<(), SessionError> {
        let session = self.registry.get(id).ok_or(SessionError::SessionNotFound)?;
        let mut session = session.lock().await;
        session.reset(handle)?;
        self.broadcast(&session, ServerEvent::GameReset);
        Ok(())
    }

    /// Forgets `handle` and cleans up the session it sat in.
    ///
    /// Constant time: only the connection's own session is touched. A session
    /// left without any connected participant is deleted; otherwise the
    /// remaining participant is told the opponent left.
    #[instrument(skip(self), fields(connection_id = %handle))]
    pub async fn on_disconnect(&self, handle: ConnectionId) {
        let Some((_, conn)) = self.connections.remove(&handle) else {
            return;
        };
        info!("Connection closed");
        if let Some(id) = conn.session {
            self.leave_session(handle, &id).await;
        }
    }

    /// Deletes sessions nobody is connected to any more.
    ///
    /// Disconnect cleanup already handles the normal case; this catches
    /// sessions whose participants vanished without a clean departure.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> usize {
        let mut candidates = self.registry.orphaned_sessions().await;
        for id in self.registry.single_participant_sessions().await {
            if !candidates.contains(&id) {
                candidates.push(id);
            }
        }

        let mut removed = 0;
        for id in candidates {
            let Some(session) = self.registry.get(&id) else {
                continue;
            };
            let mut session = session.lock().await;
            let live = session
                .subscribers()
                .into_iter()
                .any(|handle| self.connections.contains_key(&handle));
            if !live {
                self.registry.delete_locked(&mut session);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Swept abandoned sessions");
        }
        removed
    }

    async fn detach(&self, handle: ConnectionId) {
        let previous = self
            .connections
            .get_mut(&handle)
            .and_then(|mut conn| conn.session.take());
        if let Some(id) = previous {
            debug!(connection_id = %handle, session_id = %id, "Leaving previous session");
            self.leave_session(handle, &id).await;
        }
    }

    async fn leave_session(&self, handle: ConnectionId, id: &SessionId) {
        if let Some(session) = self.registry.get(id) {
            let mut session = session.lock().await;
            self.depart(&mut session, handle);
        }
    }

    fn depart(&self, session: &mut GameSession, handle: ConnectionId) {
        match session.leave(handle) {
            Departure::NotParticipant => {}
            Departure::Abandoned => self.registry.delete_locked(session),
            Departure::OpponentRemains(_) => self.broadcast(session, ServerEvent::OpponentLeft),
        }
    }

    fn bind(&self, handle: ConnectionId, id: &SessionId) -> bool {
        match self.connections.get_mut(&handle) {
            Some(mut conn) => {
                conn.session = Some(id.clone());
                true
            }
            None => false,
        }
    }

    fn broadcast(&self, session: &GameSession, event: ServerEvent) {
        let subscribers = session.subscribers();
        debug!(
            session_id = %session.id(),
            event = event.name(),
            recipients = subscribers.len(),
            "Broadcast"
        );
        for handle in subscribers {
            self.send_to(handle, event.clone());
        }
    }

    fn send_to(&self, handle: ConnectionId, event: ServerEvent) {
        // Clone the sender so no map guard outlives this call.
        let Some(tx) = self.connections.get(&handle).map(|conn| conn.tx.clone()) else {
            debug!(connection_id = %handle, event = event.name(), "Recipient gone");
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    connection_id = %handle,
                    event = event.name(),
                    "Send queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection_id = %handle, "Send queue closed");
            }
        }
    }
}
